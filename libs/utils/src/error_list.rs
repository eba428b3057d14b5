//! Accumulation of independent errors from fan-out operations.
//!
//! Both the hub (one error per host) and the agent (one error per segment,
//! or per directory pair) collect failures without stopping at the first one.
//! `ErrorList` holds the constituents and converts back into a plain
//! `anyhow::Result` with the composition contract: zero errors is success,
//! a single error is returned unwrapped, two or more are returned as the
//! list itself.

use std::fmt;

#[derive(Debug, Default)]
pub struct ErrorList(Vec<anyhow::Error>);

impl ErrorList {
    pub fn new() -> Self {
        ErrorList(Vec::new())
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.0.push(err);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.0
    }

    /// True iff any constituent matches the predicate. The predicate sees the
    /// full context chain of each constituent.
    pub fn contains(&self, mut pred: impl FnMut(&anyhow::Error) -> bool) -> bool {
        self.0.iter().any(|err| pred(err))
    }

    pub fn into_result(mut self) -> anyhow::Result<()> {
        if self.0.len() > 1 {
            return Err(anyhow::Error::new(self));
        }
        match self.0.pop() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<Vec<anyhow::Error>> for ErrorList {
    fn from(errors: Vec<anyhow::Error>) -> Self {
        ErrorList(errors)
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} errors occurred:", self.0.len())?;
        for err in &self.0 {
            writeln!(f, "* {err:#}")?;
        }
        Ok(())
    }
}

// The constituents are anyhow errors, which do not themselves implement
// `std::error::Error`, so `source()` stays at its default. The constituents
// are reachable through `errors()` after a downcast instead.
impl std::error::Error for ErrorList {}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn empty_list_is_success() {
        assert!(ErrorList::new().into_result().is_ok());
    }

    #[test]
    fn single_error_is_returned_unwrapped() {
        let mut list = ErrorList::new();
        list.push(anyhow!("permission denied"));

        let err = list.into_result().unwrap_err();
        assert!(err.downcast_ref::<ErrorList>().is_none());
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn multiple_errors_stay_inspectable() {
        let mut list = ErrorList::new();
        list.push(anyhow!("disk full"));
        list.push(anyhow!("permission denied").context("rename /data/seg1"));

        let err = list.into_result().unwrap_err();
        let list = err.downcast_ref::<ErrorList>().unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains(|e| format!("{e:#}").contains("permission denied")));
        assert!(list.contains(|e| e.to_string().contains("disk full")));
        assert!(!list.contains(|e| e.to_string().contains("timeout")));
    }

    #[test]
    fn display_lists_each_constituent() {
        let mut list = ErrorList::new();
        list.push(anyhow!("one"));
        list.push(anyhow!("two"));

        let rendered = list.to_string();
        assert!(rendered.starts_with("2 errors occurred:"));
        assert!(rendered.contains("* one"));
        assert!(rendered.contains("* two"));
    }
}
