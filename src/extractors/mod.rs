pub mod tv5;

pub use tv5::Tv5Extractor;
