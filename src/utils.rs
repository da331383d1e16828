/// Format an integer with thousands separators (1234567 -> "1,234,567")
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.insert(0, ',');
        }
        result.insert(0, c);
    }
    result
}

/// Format a price with two decimals and thousands separators (80123.456 -> "80,123.46")
pub fn format_price(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let grouped = int_part
        .parse::<usize>()
        .map(format_number)
        .unwrap_or_else(|_| int_part.to_string());
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Format a price change with an explicit sign (+1,234.50 / -0.25)
pub fn format_change(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", format_price(value))
    } else {
        format_price(value)
    }
}
