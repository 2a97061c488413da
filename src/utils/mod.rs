//! Small cross-cutting helpers, mirroring the teacher crate's `utils`
//! module split into a macro-and-misc `mod.rs` and a `fs` helper module.

pub mod fs;

/// Declare a builder-style setter method on a struct field, in the style of
/// the teacher crate's `utils::setter!`.
///
/// Two forms:
/// ```ignore
/// setter!(base_url, String);                 // plain move-in setter
/// setter!(timeout, Duration, Duration::from_secs(30)); // custom default unused here
/// ```
#[macro_export]
macro_rules! setter {
    ($field:ident, $ty:ty) => {
        pub fn $field(mut self, value: $ty) -> Self {
            self.$field = value;
            self
        }
    };
    ($field:ident, $method:ident, $ty:ty, $init:expr) => {
        pub fn $method(mut self, value: $ty) -> Self {
            self.$field = $init(value);
            self
        }
    };
}
