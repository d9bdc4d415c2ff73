pub mod pack;

pub use pack::{pack, pack_with, PackError, PackReport};
