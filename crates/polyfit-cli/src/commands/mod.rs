pub mod info;
pub mod reconstruct;
