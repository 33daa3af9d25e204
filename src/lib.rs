pub mod preset;
pub mod shader;
