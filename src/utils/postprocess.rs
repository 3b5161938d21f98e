//! Post-processing of LLM replies and block contents.

pub mod json;
