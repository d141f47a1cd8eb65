pub mod executor;
pub mod picker;

pub use executor::Action;
pub use picker::Picker;
