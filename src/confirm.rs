use std::io::{self, BufRead, Write};

pub const AFFIRMATIVE: &str = "yes";

const BANNER: &str = "\
============================================================
Category Hierarchy Reorganization
============================================================

This will:
1. Parse existing category names with the path delimiter
2. Create a hierarchical category structure
3. Update the database with new relationships

WARNING: This will modify your database!
============================================================
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Proceed,
    Declined,
}

/// Show the warning banner and ask the operator to confirm. Only the exact
/// answer `yes` proceeds: the line terminator is dropped, nothing else is
/// trimmed. EOF or anything else declines.
pub fn confirm<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<Confirmation> {
    output.write_all(BANNER.as_bytes())?;
    write!(output, "\nDo you want to proceed? ({AFFIRMATIVE}/no): ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(Confirmation::Declined);
    }
    if line.trim_end_matches(['\r', '\n']) == AFFIRMATIVE {
        Ok(Confirmation::Proceed)
    } else {
        Ok(Confirmation::Declined)
    }
}
