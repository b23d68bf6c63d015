//! 客户端文件名清洗与重名规避。

use std::fmt;

use crate::storage::Storage;

/// 只含 `[A-Za-z0-9_.-]`、不含路径分隔符的目标文件名。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedFilename(String);

impl SanitizedFilename {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SanitizedFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 清洗文件名，并在目标目录中已存在同名文件时追加 `_1`、`_2`…
///
/// 存在性检查与后续写入之间不是原子的，并发上传同名文件可能得到相同结果。
pub async fn sanitize(raw: &str, storage: &Storage) -> SanitizedFilename {
    let cleaned = clean(raw);
    if !cleaned.is_empty() && !storage.exists(&cleaned).await {
        return SanitizedFilename(cleaned);
    }

    let (base, ext) = split_extension(&cleaned);
    let mut counter: u64 = 1;
    loop {
        let candidate = with_suffix(base, ext, counter);
        if !storage.exists(&candidate).await {
            return SanitizedFilename(candidate);
        }
        counter += 1;
    }
}

/// 仅清洗、不做重名规避；用于续传时定位已开始写入的文件。
pub async fn sanitize_in_place(raw: &str, storage: &Storage) -> SanitizedFilename {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        return sanitize(raw, storage).await;
    }
    SanitizedFilename(cleaned)
}

/// 去掉目录部分并替换非法字符。
pub fn clean(raw: &str) -> String {
    let trimmed = raw.trim_end_matches(['/', '\\']);
    let last = trimmed.rsplit(['/', '\\']).next().unwrap_or_default();
    if last == "." || last == ".." {
        return String::new();
    }
    last.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((base, ext)) if !ext.is_empty() => (base, Some(ext)),
        Some((base, _)) => (base, None),
        None => (name, None),
    }
}

fn with_suffix(base: &str, ext: Option<&str>, counter: u64) -> String {
    match ext {
        Some(ext) => format!("{base}_{counter}.{ext}"),
        None => format!("{base}_{counter}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn is_safe(name: &str) -> bool {
        name.chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
    }

    #[test]
    fn clean_strips_directories_and_replaces_characters() {
        assert_eq!(clean("../../etc/passwd"), "passwd");
        assert_eq!(clean("C:\\Users\\me\\photo 1.jpg"), "photo_1.jpg");
        assert_eq!(clean("dir/sub/"), "sub");
        assert_eq!(clean("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(clean("a;b|c.tar.gz"), "a_b_c.tar.gz");
        assert_eq!(clean(".."), "");
        assert_eq!(clean("/"), "");
    }

    #[test]
    fn split_extension_uses_last_dot() {
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_extension("README"), ("README", None));
        assert_eq!(split_extension(".htaccess"), ("", Some("htaccess")));
        assert_eq!(split_extension("name."), ("name", None));
    }

    #[tokio::test]
    async fn hostile_names_resolve_inside_target_directory() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());
        let inputs = [
            "../../etc/passwd",
            "..\\..\\windows\\system32\\drivers\\etc\\hosts",
            "/absolute/path.txt",
            "..",
            ".",
            "",
            "....//....//x",
            "name\0with\nnul",
            "ok/../../..",
        ];
        for raw in inputs {
            let name = sanitize(raw, &storage).await;
            assert!(is_safe(name.as_str()), "{raw:?} -> {name}");
            let path = storage
                .resolve_file(name.as_str())
                .await
                .unwrap_or_else(|_| panic!("{raw:?} resolved outside: {name}"));
            assert_eq!(path.parent(), Some(temp.path()));
        }
    }

    #[tokio::test]
    async fn empty_name_gets_suffix_only() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());
        assert_eq!(sanitize("", &storage).await.as_str(), "_1");
        assert_eq!(sanitize("../", &storage).await.as_str(), "_1");
    }

    #[tokio::test]
    async fn collisions_increment_suffix_until_free() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());

        let mut seen = Vec::new();
        for _ in 0..4 {
            let name = sanitize("my report.pdf", &storage).await;
            assert!(!storage.exists(name.as_str()).await);
            std::fs::write(temp.path().join(name.as_str()), b"x").expect("write file");
            seen.push(name.into_string());
        }
        assert_eq!(
            seen,
            ["my_report.pdf", "my_report_1.pdf", "my_report_2.pdf", "my_report_3.pdf"]
        );
    }

    #[tokio::test]
    async fn collision_without_extension_appends_to_base() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());
        std::fs::write(temp.path().join("Makefile"), b"all:").expect("write file");
        assert_eq!(sanitize("Makefile", &storage).await.as_str(), "Makefile_1");
    }

    #[tokio::test]
    async fn sanitize_in_place_ignores_existing_file() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());
        std::fs::write(temp.path().join("movie.mp4"), b"part").expect("write file");
        assert_eq!(
            sanitize_in_place("movie.mp4", &storage).await.as_str(),
            "movie.mp4"
        );
    }
}
