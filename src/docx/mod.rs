pub mod package;
pub mod style;
pub mod substitute;
pub mod tables;
pub mod tree;
pub mod xml;

#[cfg(test)]
pub(crate) mod testutil;
