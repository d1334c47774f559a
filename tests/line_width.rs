use std::fs;
use std::path::{Path, PathBuf};

const MAX_WIDTH: usize = 100;

fn rust_sources(dir: &Path, found: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir).unwrap_or_else(|e| panic!("read {}: {e}", dir.display()));
    for entry in entries {
        let path = entry.expect("directory entry").path();
        if path.is_dir() {
            rust_sources(&path, found);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            found.push(path);
        }
    }
}

#[test]
fn source_lines_fit_max_width() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = Vec::new();
    rust_sources(&root.join("src"), &mut files);
    rust_sources(&root.join("tests"), &mut files);

    let mut too_wide = Vec::new();
    for file in &files {
        let text = fs::read_to_string(file).expect("read source file");
        for (number, line) in text.lines().enumerate() {
            if line.chars().count() > MAX_WIDTH {
                too_wide.push(format!("{}:{}", file.display(), number + 1));
            }
        }
    }
    assert!(too_wide.is_empty(), "lines over {MAX_WIDTH} columns: {too_wide:?}");
}
