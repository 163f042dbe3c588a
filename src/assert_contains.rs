/// Helper to assert rendered exposition text contains specific snippets and/or lines
pub trait AssertContains: ToString {
    /// Asserts that the [`ToString`] representation contains all the specified text snippets
    ///
    /// Returns the string for convenient chaining
    ///
    /// # Examples
    ///
    /// ```
    /// # use kopia_metrics::AssertContains;
    /// "# HELP file_count Number of files in the snapshot".assert_contains_snippets(&[
    ///     "# HELP file_count",
    ///     "files in the snapshot",
    /// ]);
    /// ```
    ///
    /// ```should_panic
    /// # use kopia_metrics::AssertContains;
    /// "# HELP file_count Number of files".assert_contains_snippets(&[
    ///     "dir_count", // panic: missing from input string
    /// ]);
    /// ```
    ///
    /// ```should_panic
    /// # use kopia_metrics::AssertContains;
    /// "file_count 10".assert_contains_snippets(&[]); // panic: empty list
    /// ```
    #[track_caller]
    fn assert_contains_snippets(&self, snippets: &[&str]) -> String {
        assert!(
            !snippets.is_empty(),
            "refusing empty list for assert_contains_snippets"
        );

        let s = self.to_string();
        for snippet in snippets {
            assert!(
                s.contains(snippet),
                r#"expected:
"""
{snippet}
"""
to be contained in found string:
"""
{s}
""""#
            );
        }
        s
    }

    /// Asserts that the [`ToString`] representation contains all the specified lines
    ///
    /// Lines must match exactly, so a sample line also pins its value.
    /// Returns the string for convenient chaining
    ///
    /// # Examples
    ///
    /// ```
    /// # use kopia_metrics::AssertContains;
    /// r#"# TYPE dir_count gauge
    /// dir_count{host="laptop",path="/home",user="alice"} 2
    /// error_count{host="laptop",path="/home",user="alice"} 0"#.assert_contains_lines(&[
    ///     r#"error_count{host="laptop",path="/home",user="alice"} 0"#,
    ///     r#"dir_count{host="laptop",path="/home",user="alice"} 2"#,
    /// ]);
    /// ```
    ///
    /// ```should_panic
    /// # use kopia_metrics::AssertContains;
    /// r#"dir_count{host="laptop",path="/home",user="alice"} 25"#.assert_contains_lines(&[
    ///     r#"dir_count{host="laptop",path="/home",user="alice"} 2"#, // <-- panic: value differs
    /// ]);
    /// ```
    ///
    /// ```should_panic
    /// # use kopia_metrics::AssertContains;
    /// "file_count 10".assert_contains_lines(&[]); // panic: empty list
    /// ```
    #[track_caller]
    fn assert_contains_lines(&self, lines: &[&str]) -> String {
        assert!(
            !lines.is_empty(),
            "refusing empty list for assert_contains_lines"
        );

        let s = self.to_string();
        for line in lines {
            assert!(
                s.lines().any(|l| l == *line),
                r#"expected line:
"""
{line}
"""
to be contained in found string:
"""
{s}
""""#
            );
        }
        s
    }
}
impl<T> AssertContains for T where T: ToString {}
