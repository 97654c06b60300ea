pub fn sanitize_filename(filename: &str) -> String {
    // Remove or replace characters that are invalid in filenames
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// `Content-Disposition` value for a download; non-ASCII names go in `filename*`.
pub fn attachment_header(filename: &str) -> String {
    let name = sanitize_filename(filename);
    if name.is_ascii() {
        format!("attachment; filename=\"{}\"", name)
    } else {
        let fallback: String = name
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(&name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("hello/world"), "hello-world");
        assert_eq!(sanitize_filename("test<>file"), "test__file");
        assert_eq!(sanitize_filename("12345_1s1e_720p.mp4"), "12345_1s1e_720p.mp4");
    }

    #[test]
    fn test_attachment_header() {
        assert_eq!(
            attachment_header("12345_1s1e_720p.mp4"),
            "attachment; filename=\"12345_1s1e_720p.mp4\""
        );
        assert_eq!(
            attachment_header("сезон.mp4"),
            "attachment; filename=\"_____.mp4\"; filename*=UTF-8''%D1%81%D0%B5%D0%B7%D0%BE%D0%BD.mp4"
        );
    }
}
