//! Utility functions and types

pub mod data_loader;

pub use data_loader::{save_csv, DataLoader, FileInfo};
