//! Token counting traits and utilities

pub mod tiktoken;

/// Trait for counting tokens in a string.
pub trait CountToken {
    fn count_token(&self, string: &str) -> usize;
}

/// Blanket impl of CountToken for Fn(&str) -> usize.
impl<F> CountToken for F where F: Fn(&str) -> usize {
    fn count_token(&self, string: &str) -> usize {
        self(string)
    }
}

/// Count the number of tokens in a string by the length of the string.
#[inline]
pub fn count_tokens_by_len(string: &str) -> usize {
    string.len()
}

/// Count whitespace separated words, a rough estimate that needs no tokenizer.
#[inline]
pub fn count_tokens_by_words(string: &str) -> usize {
    string.split_whitespace().count()
}

#[cfg(test)]
mod test_token {
    use super::{count_tokens_by_words, CountToken};

    #[test]
    fn test_str_len_impl() {
        let counter = str::len;
        let size = counter.count_token("");
        assert_eq!(0, size);
    }

    #[test]
    fn test_count_words() {
        assert_eq!(4, count_tokens_by_words("## @Block Topic topic_block\n"));
    }
}
