// publisher-core/src/infrastructure/compiler/mod.rs

pub mod outline;

pub use outline::OutlineCompiler;
