// Library modules for coverstash
// This allows tests to access internal modules

pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod models;

#[cfg(test)]
pub mod test_utils;
