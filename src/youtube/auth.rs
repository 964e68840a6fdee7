// YouTube request credentials for yt-dlp
//
// Authentication is optional: a raw cookie header (YT_COOKIES) and/or a
// Netscape cookie file (YT_COOKIES_FILE). With neither, yt-dlp runs
// unauthenticated.

use std::path::PathBuf;

// Desktop Chrome UA sent alongside the cookie header so the session looks
// like the browser the cookies came from
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default)]
pub struct YouTubeAuth {
    cookie_header: Option<String>,
    cookies_file: Option<PathBuf>,
}

impl YouTubeAuth {
    pub fn new(cookie_header: Option<String>, cookies_file: Option<PathBuf>) -> Self {
        // empty env vars count as unset
        let cookie_header = cookie_header
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        YouTubeAuth {
            cookie_header,
            cookies_file,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.cookie_header.is_some() || self.cookies_file.is_some()
    }

    /// Extra yt-dlp arguments carrying the credentials
    pub fn ytdlp_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(cookie) = &self.cookie_header {
            args.push("--add-header".to_string());
            args.push(format!("Cookie:{}", cookie));
            args.push("--user-agent".to_string());
            args.push(BROWSER_USER_AGENT.to_string());
        }

        if let Some(path) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_credentials_means_no_args() {
        let auth = YouTubeAuth::new(None, None);
        assert!(!auth.is_authenticated());
        assert!(auth.ytdlp_args().is_empty());
    }

    #[test]
    fn blank_cookie_is_ignored() {
        let auth = YouTubeAuth::new(Some("  ".to_string()), None);
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn cookie_header_and_file() {
        let auth = YouTubeAuth::new(
            Some("SID=abc; HSID=def".to_string()),
            Some(PathBuf::from("/tmp/cookies.txt")),
        );
        let args = auth.ytdlp_args();

        assert_eq!(args[0], "--add-header");
        assert_eq!(args[1], "Cookie:SID=abc; HSID=def");
        assert_eq!(args[2], "--user-agent");
        assert_eq!(&args[4..], &["--cookies".to_string(), "/tmp/cookies.txt".to_string()]);
    }
}
