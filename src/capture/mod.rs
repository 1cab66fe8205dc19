pub mod upload;

pub use upload::{encode_data_uri, load_data_uri};
