pub mod damage;

pub use damage::*;
