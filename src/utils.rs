//! Small string utilities shared across the crate.

/// Finds the `(line, col)` position of a byte index into a string, both
/// one-indexed. Used to anchor lift-error diagnostics at the scanner
/// position a `[`/`]` mismatch was discovered at.
pub trait FindLnCol {
    /// Returns the `(ln, col)` position, in characters, of the `nth` byte.
    /// Returns `None` if `nth_byte` is not a char boundary within the
    /// string (including one past its end).
    /// # Note
    /// Lines and columns start counting from one, not from zero.
    /// ```
    /// use ciscfuck::utils::FindLnCol;
    ///
    /// assert_eq!("".byte_find_ln_col(0), Some((1, 1)));
    /// assert_ne!("".byte_find_ln_col(0), Some((0, 0)));
    /// ```
    fn byte_find_ln_col(&self, nth_byte: usize) -> Option<(usize, usize)>;
}

impl<T: AsRef<str>> FindLnCol for T {
    fn byte_find_ln_col(&self, nth_byte: usize) -> Option<(usize, usize)> {
        let string = self.as_ref();
        let sub_string = string.get(0..nth_byte)?;
        let new_lines = sub_string.char_indices().filter(|(_, c)| *c == '\n');

        let line = new_lines.clone().count();
        let last_nl_byte_index = new_lines.map(|(i, _)| i).last();
        // +1 to skip past the newline byte itself.
        let start_line_byte_index = last_nl_byte_index.map_or(0, |b| b + 1);

        let column = string[start_line_byte_index..nth_byte].len();

        Some((line + 1, column + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_find_ln_col_start_of_empty_string() {
        assert_eq!("".byte_find_ln_col(0), Some((1, 1)));
    }

    #[test]
    fn byte_find_ln_col_first_line() {
        assert_eq!("abc".byte_find_ln_col(2), Some((1, 3)));
    }

    #[test]
    fn byte_find_ln_col_after_newline() {
        assert_eq!("ab\ncd".byte_find_ln_col(4), Some((2, 2)));
    }

    #[test]
    fn byte_find_ln_col_out_of_bounds_char_boundary() {
        assert_eq!("héllo".byte_find_ln_col(2), None);
    }
}
