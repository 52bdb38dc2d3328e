//! Shared proptest case count, overridable through `PROPTEST_CASES`.

#[allow(dead_code)]
pub fn cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(100)
}
