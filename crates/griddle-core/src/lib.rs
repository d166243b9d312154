pub mod adapter;
pub mod binder;
pub mod builder;
pub mod context;
pub mod declarations;
pub mod driver;
pub mod execution;
pub mod loader;
pub mod models;
pub mod package;
pub mod toolchain;
