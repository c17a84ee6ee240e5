pub mod extract;
pub mod resources;
pub mod validation;

pub use extract::{ClientIp, FormInput, Json, Path, Query, UploadedFile};
pub use validation::Validator;
