//! Analyzer implementations.

pub mod github;

pub use github::{language_breakdown, GithubAnalyzer, LanguageShare};
