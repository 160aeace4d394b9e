//! Where Mneme stores its own data (config and, by default, the corpus).
//!
//! Source documents stay wherever the operator keeps them; only derived
//! state lives here.

use std::path::PathBuf;

/// Returns the directory where Mneme stores config and corpus output.
/// Creates the directory if it doesn't exist; returns `None` if we can't
/// determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Mneme", "Mneme")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_some() {
        assert!(app_data_dir().is_some());
    }
}
