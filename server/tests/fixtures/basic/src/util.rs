pub fn clamp(value: i64, low: i64, high: i64) -> i64 {
    value.max(low).min(high)
}

pub fn greet_all(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| crate::greet(n)).collect()
}
