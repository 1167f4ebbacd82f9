mod frame;

pub use frame::{CapturedFrame, BODY_STAMP_FORMAT, FILE_STAMP_FORMAT};
