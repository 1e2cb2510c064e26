pub mod device;
pub mod stub_api;

pub use device::{line, TestDevice};
pub use stub_api::{ApiCall, StubApi};
