pub mod commands;
pub mod doctor;
pub mod error;
pub mod kubeconfig;
pub mod logging;
pub mod merge;
pub mod paths;
pub mod registry;
pub mod resolver;
pub mod shell;
pub mod state;
pub mod ui;

#[cfg(test)]
pub mod test_utils;
