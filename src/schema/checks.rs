use once_cell::sync::Lazy;
use regex::Regex;

// ------------------------------- Policy ---------------------------------- //

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    // same shape the usual schema libraries accept: local@domain.tld, no spaces
    Regex::new(r"^[A-Za-z0-9._%+\-']+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("static email pattern compiles")
});

/// A rule plus an optional caller-supplied message overriding the default one.
#[derive(Clone, Debug)]
pub struct Check<R> {
    pub rule: R,
    pub message: Option<String>,
}

impl<R> Check<R> {
    pub fn new(rule: R) -> Self { Self { rule, message: None } }
}

pub type StringCheck = Check<StringRule>;
pub type NumberCheck = Check<NumberRule>;
pub type ArrayCheck = Check<ArrayRule>;

#[derive(Clone, Debug)]
pub enum StringRule {
    Min(usize),
    Max(usize),
    Length(usize),
    Email,
    Regex(Regex),
}

#[derive(Clone, Debug)]
pub enum NumberRule {
    Min(f64),
    Max(f64),
    Int,
    Positive,
}

#[derive(Clone, Debug)]
pub enum ArrayRule {
    Min(usize),
    Max(usize),
}

// ------------------------------- Rules ------------------------------------ //

impl StringRule {
    fn violated(&self, s: &str) -> bool {
        let len = s.chars().count();
        match self {
            StringRule::Min(n) => len < *n,
            StringRule::Max(n) => len > *n,
            StringRule::Length(n) => len != *n,
            StringRule::Email => !EMAIL.is_match(s),
            StringRule::Regex(rx) => !rx.is_match(s),
        }
    }

    fn default_message(&self) -> String {
        match self {
            StringRule::Min(n) => format!("String must contain at least {n} character(s)"),
            StringRule::Max(n) => format!("String must contain at most {n} character(s)"),
            StringRule::Length(n) => format!("String must contain exactly {n} character(s)"),
            StringRule::Email => "Invalid email".to_string(),
            StringRule::Regex(_) => "Invalid".to_string(),
        }
    }
}

impl NumberRule {
    fn violated(&self, x: f64) -> bool {
        match self {
            NumberRule::Min(n) => x < *n,
            NumberRule::Max(n) => x > *n,
            NumberRule::Int => x.fract() != 0.0,
            NumberRule::Positive => x <= 0.0,
        }
    }

    fn default_message(&self) -> String {
        match self {
            NumberRule::Min(n) => format!("Number must be greater than or equal to {}", bound_text(*n)),
            NumberRule::Max(n) => format!("Number must be less than or equal to {}", bound_text(*n)),
            NumberRule::Int => "Expected integer, received float".to_string(),
            NumberRule::Positive => "Number must be greater than 0".to_string(),
        }
    }
}

impl ArrayRule {
    fn violated(&self, len: usize) -> bool {
        match self {
            ArrayRule::Min(n) => len < *n,
            ArrayRule::Max(n) => len > *n,
        }
    }

    fn default_message(&self) -> String {
        match self {
            ArrayRule::Min(n) => format!("Array must contain at least {n} element(s)"),
            ArrayRule::Max(n) => format!("Array must contain at most {n} element(s)"),
        }
    }
}

impl StringCheck {
    /// `Some(message)` when `s` breaks the rule.
    pub fn run(&self, s: &str) -> Option<String> {
        self.rule.violated(s).then(|| self.message.clone().unwrap_or_else(|| self.rule.default_message()))
    }
}

impl NumberCheck {
    pub fn run(&self, x: f64) -> Option<String> {
        self.rule.violated(x).then(|| self.message.clone().unwrap_or_else(|| self.rule.default_message()))
    }
}

impl ArrayCheck {
    pub fn run(&self, len: usize) -> Option<String> {
        self.rule.violated(len).then(|| self.message.clone().unwrap_or_else(|| self.rule.default_message()))
    }
}

/// Bound as shown in check messages: `18`, not `18.0`.
pub(crate) fn bound_text(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
