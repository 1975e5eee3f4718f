pub(crate) mod logger;
pub(crate) mod styles;

pub(crate) static CHECK: &str = "✔";
