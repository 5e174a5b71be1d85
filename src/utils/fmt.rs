//! Tools for formatting.

use std::fmt;

//------------ WriteOrPanic --------------------------------------------------

/// A target for writing formatted data into without error.
///
/// This provides a method `write_fmt` for use with the `write!` macro and
/// friends that does not return a result. Rather, it panics if an error
/// occurs.
pub trait WriteOrPanic {
    fn write_fmt(&mut self, args: fmt::Arguments);
}

impl WriteOrPanic for Vec<u8> {
    fn write_fmt(&mut self, args: fmt::Arguments) {
        std::io::Write::write_fmt(self, args).expect("formatting failed");
    }
}

impl WriteOrPanic for String {
    fn write_fmt(&mut self, args: fmt::Arguments) {
        std::fmt::Write::write_fmt(self, args).expect("formatting failed");
    }
}


//------------ HumanSize -----------------------------------------------------

/// A file size formatted for humans.
///
/// Sizes below one kilobyte are shown as a plain number of bytes, anything
/// larger is scaled by powers of 1024 and shown with one decimal.
#[derive(Clone, Copy, Debug)]
pub struct HumanSize(pub u64);

impl fmt::Display for HumanSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const UNITS: &[&str] = &["KB", "MB", "GB", "TB", "PB", "EB"];

        if self.0 < 1024 {
            return write!(f, "{} B", self.0)
        }
        let mut size = self.0 as f64 / 1024.;
        let mut unit = 0;
        while size >= 1024. && unit + 1 < UNITS.len() {
            size /= 1024.;
            unit += 1;
        }
        write!(f, "{:.1} {}", size, UNITS[unit])
    }
}


//============ Tests =========================================================
