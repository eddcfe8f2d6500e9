//! Multilayer perceptron on top of an LSTM history encoder.
mod base;
mod config;
pub use base::RecurrentMlp;
pub use config::RecurrentMlpConfig;
