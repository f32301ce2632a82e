//! Turn a record's `mediaUrl` into something a player can show.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static YOUTUBE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]+)")
        .expect("valid youtube pattern")
});
static VIMEO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vimeo\.com/(\d+)").expect("valid vimeo pattern"));
static DRIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"drive\.google\.com/file/d/([a-zA-Z0-9_-]+)").expect("valid drive pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    /// Third-party player page.
    Iframe,
    /// Direct stream for a native video element.
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(rename = "type")]
    pub kind: EmbedKind,
    pub src: String,
}

fn capture<'a>(re: &Regex, url: &'a str) -> Option<&'a str> {
    re.captures(url)?.get(1).map(|m| m.as_str())
}

pub fn resolve_embed(url: &str) -> Embed {
    let iframe = |src: String| Embed {
        kind: EmbedKind::Iframe,
        src,
    };

    if let Some(id) = capture(&YOUTUBE, url) {
        return iframe(format!(
            "https://www.youtube.com/embed/{}?autoplay=1&rel=0&modestbranding=1",
            id
        ));
    }
    if let Some(id) = capture(&VIMEO, url) {
        return iframe(format!(
            "https://player.vimeo.com/video/{}?autoplay=1&color=e53e3e",
            id
        ));
    }
    if let Some(id) = capture(&DRIVE, url) {
        return iframe(format!("https://drive.google.com/file/d/{}/preview", id));
    }

    Embed {
        kind: EmbedKind::Video,
        src: url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_variants() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtube.com/embed/dQw4w9WgXcQ",
        ] {
            let embed = resolve_embed(url);
            assert_eq!(embed.kind, EmbedKind::Iframe);
            assert_eq!(
                embed.src,
                "https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1&rel=0&modestbranding=1"
            );
        }
    }

    #[test]
    fn patterns_compile() {
        for re in [&*YOUTUBE, &*VIMEO, &*DRIVE] {
            assert_eq!(re.captures_len(), 2);
        }
    }

    #[test]
    fn vimeo_and_drive() {
        assert_eq!(
            resolve_embed("https://vimeo.com/76979871").src,
            "https://player.vimeo.com/video/76979871?autoplay=1&color=e53e3e"
        );
        assert_eq!(
            resolve_embed("https://drive.google.com/file/d/1AbC-_9/view?usp=sharing").src,
            "https://drive.google.com/file/d/1AbC-_9/preview"
        );
    }

    #[test]
    fn anything_else_plays_directly() {
        let url = "https://bucket.s3.amazonaws.com/uploads/abc-film.mp4";
        let embed = resolve_embed(url);
        assert_eq!(embed.kind, EmbedKind::Video);
        assert_eq!(embed.src, url);
        assert_eq!(
            serde_json::to_value(&embed).unwrap(),
            serde_json::json!({"type": "video", "src": url})
        );
    }
}
