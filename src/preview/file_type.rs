use serde::Serialize;

/// Semantic file category used to pick an icon and a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Code,
    Text,
    Markdown,
    Pdf,
    Audio,
    Video,
    Spreadsheet,
    Csv,
    Archive,
    Database,
    Other,
}

const CATEGORY_TABLE: &[(FileCategory, &[&str])] = &[
    (
        FileCategory::Image,
        &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"],
    ),
    (
        FileCategory::Code,
        &[
            "js", "jsx", "ts", "tsx", "html", "css", "json", "py", "java", "c", "cpp",
        ],
    ),
    (FileCategory::Text, &["txt", "log", "env"]),
    (FileCategory::Markdown, &["md", "markdown"]),
    (FileCategory::Pdf, &["pdf"]),
    (FileCategory::Audio, &["mp3", "wav", "ogg", "flac"]),
    (FileCategory::Video, &["mp4", "webm", "mov", "avi"]),
    (FileCategory::Csv, &["csv", "tsv"]),
    (FileCategory::Spreadsheet, &["xls", "xlsx"]),
    (FileCategory::Archive, &["zip", "rar", "tar", "gz"]),
    (FileCategory::Database, &["db", "sqlite", "sql"]),
];

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Code => "code",
            FileCategory::Text => "text",
            FileCategory::Markdown => "markdown",
            FileCategory::Pdf => "pdf",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Spreadsheet => "spreadsheet",
            FileCategory::Csv => "csv",
            FileCategory::Archive => "archive",
            FileCategory::Database => "database",
            FileCategory::Other => "other",
        }
    }

    /// Fixed display string for the category.
    pub fn display_name(&self) -> &'static str {
        match self {
            FileCategory::Image => "Image",
            FileCategory::Code => "Code",
            FileCategory::Text => "Text",
            FileCategory::Markdown => "Markdown",
            FileCategory::Pdf => "PDF",
            FileCategory::Audio => "Audio",
            FileCategory::Video => "Video",
            FileCategory::Spreadsheet => "Spreadsheet",
            FileCategory::Csv => "CSV",
            FileCategory::Archive => "Archive",
            FileCategory::Database => "Database",
            FileCategory::Other => "File",
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            FileCategory::Image => "file-image",
            FileCategory::Code => "file-code",
            FileCategory::Text | FileCategory::Markdown => "file-text",
            FileCategory::Pdf => "file-type",
            FileCategory::Audio => "file-audio",
            FileCategory::Video => "file-video",
            FileCategory::Spreadsheet | FileCategory::Csv => "file-spreadsheet",
            FileCategory::Archive => "archive",
            FileCategory::Database => "database",
            FileCategory::Other => "file",
        }
    }

    fn size_multiplier(&self) -> f64 {
        match self {
            FileCategory::Image => 5.0,
            FileCategory::Video => 20.0,
            FileCategory::Audio => 10.0,
            FileCategory::Code => 0.5,
            FileCategory::Text => 0.3,
            FileCategory::Markdown => 0.3,
            FileCategory::Pdf => 8.0,
            FileCategory::Spreadsheet => 3.0,
            FileCategory::Csv => 2.0,
            FileCategory::Archive => 5.0,
            FileCategory::Database => 4.0,
            FileCategory::Other => 1.0,
        }
    }
}

/// Lowercased text after the final `.`, empty when there is none.
pub fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Last path segment, or `"file"` for paths ending in `/`.
pub fn filename_of(path: &str) -> &str {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "file",
    }
}

pub fn classify(filename: &str) -> FileCategory {
    let ext = extension_of(filename);
    CATEGORY_TABLE
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(category, _)| *category)
        .unwrap_or(FileCategory::Other)
}

pub fn label(category: FileCategory, extension: Option<&str>) -> String {
    match (category, extension.filter(|e| !e.is_empty())) {
        (FileCategory::Code, Some(ext)) => ext.to_uppercase(),
        _ => category.display_name().to_string(),
    }
}

/// Synthetic size string derived from the path length. It does not reflect
/// the real file size.
pub fn estimate_size(path: &str, category: FileCategory) -> String {
    let base = ((path.chars().count() * 5) % 800 + 200) as f64;
    format_bytes(base * category.size_multiplier())
}

pub fn format_bytes(size: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    if size < KB {
        format!("{} B", size.round() as u64)
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{:.1} MB", size / MB)
    }
}

/// Syntax-highlighting language for code viewers.
pub fn language_for_filename(filename: &str) -> &'static str {
    match extension_of(filename).as_str() {
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "less" => "less",
        "js" => "javascript",
        "jsx" => "jsx",
        "ts" => "typescript",
        "tsx" => "tsx",
        "json" | "jsonc" => "json",
        "xml" => "xml",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "ini" => "ini",
        "env" | "gitignore" | "dockerignore" => "bash",
        "py" => "python",
        "rb" => "ruby",
        "php" => "php",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "rs" => "rust",
        "sh" | "bash" | "zsh" => "bash",
        "ps1" => "powershell",
        "bat" | "cmd" => "batch",
        "svg" => "svg",
        "tex" => "latex",
        "graphql" | "gql" => "graphql",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_table() {
        for (category, exts) in CATEGORY_TABLE {
            for ext in exts.iter() {
                let name = format!("file.{}", ext);
                assert_eq!(classify(&name), *category, "extension {}", ext);
                let upper = format!("FILE.{}", ext.to_uppercase());
                assert_eq!(classify(&upper), *category, "extension {}", ext);
            }
        }
    }

    #[test]
    fn test_classify_unmapped() {
        for name in ["a.rs", "b.docx", "c.", "Makefile", "", "archive.tar.bz2"] {
            assert_eq!(classify(name), FileCategory::Other, "name {:?}", name);
        }
        assert_eq!(classify("archive.tar.gz"), FileCategory::Archive);
    }

    #[test]
    fn test_extension_and_filename() {
        assert_eq!(extension_of("Report.PDF"), "pdf");
        assert_eq!(extension_of("README"), "");
        assert_eq!(filename_of("/workspace/docs/a.md"), "a.md");
        assert_eq!(filename_of("/workspace/docs/"), "file");
        assert_eq!(filename_of("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_label() {
        assert_eq!(label(FileCategory::Code, Some("py")), "PY");
        assert_eq!(label(FileCategory::Code, Some("")), "Code");
        assert_eq!(label(FileCategory::Code, None), "Code");
        assert_eq!(label(FileCategory::Pdf, None), "PDF");
        assert_eq!(label(FileCategory::Csv, Some("tsv")), "CSV");
        assert_eq!(label(FileCategory::Other, Some("bin")), "File");
    }

    #[test]
    fn test_format_bytes_thresholds() {
        assert_eq!(format_bytes(0.0), "0 B");
        assert_eq!(format_bytes(67.5), "68 B");
        assert_eq!(format_bytes(1023.0), "1023 B");
        assert_eq!(format_bytes(1024.0), "1.0 KB");
        assert_eq!(format_bytes(5.0 * 1024.0 * 1024.0), "5.0 MB");
    }

    #[test]
    fn test_estimate_size_is_deterministic() {
        // 9 chars: (45 % 800 + 200) * 5 = 1225 bytes
        assert_eq!(estimate_size("photo.png", FileCategory::Image), "1.2 KB");
        assert_eq!(estimate_size("a.txt", FileCategory::Text), "68 B");
        assert_eq!(
            estimate_size("a.txt", FileCategory::Text),
            estimate_size("a.txt", FileCategory::Text)
        );
    }

    #[test]
    fn test_language_hint() {
        assert_eq!(language_for_filename("main.rs"), "rust");
        assert_eq!(language_for_filename("index.HTM"), "html");
        assert_eq!(language_for_filename(".env"), "bash");
        assert_eq!(language_for_filename("notes.md"), "text");
    }

    #[test]
    fn test_icons() {
        assert_eq!(FileCategory::Markdown.icon_name(), "file-text");
        assert_eq!(FileCategory::Csv.icon_name(), "file-spreadsheet");
        assert_eq!(FileCategory::Other.icon_name(), "file");
    }
}
