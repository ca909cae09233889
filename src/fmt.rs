/// Format whole rupiah with dot thousands separators: Rp1.500.000
pub fn rupiah(val: i64) -> String {
    let digits = val.unsigned_abs().to_string();

    let mut with_dots = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_dots.push('.');
        }
        with_dots.push(c);
    }
    let with_dots: String = with_dots.chars().rev().collect();

    if val < 0 {
        format!("-Rp{with_dots}")
    } else {
        format!("Rp{with_dots}")
    }
}
