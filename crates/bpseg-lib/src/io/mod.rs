pub mod manifest;
pub mod npy;
pub mod text;
pub mod wfdb;
