/// Format a float as a sterling amount with thousands separators: £1,234.56
pub fn money(val: f64) -> String {
    let val = round_cents(val);
    let negative = val < 0.0;
    let abs = val.abs();
    let pence = format!("{:.2}", abs);
    let (int_part, dec_part) = pence.split_once('.').unwrap_or((pence.as_str(), "00"));

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-£{with_commas}.{dec_part}")
    } else {
        format!("£{with_commas}.{dec_part}")
    }
}

/// Round half away from zero to whole pence. Negative zero comes back as zero.
pub fn round_cents(val: f64) -> f64 {
    let rounded = (val * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
