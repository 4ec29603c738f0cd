pub mod youtube_api;
pub mod youtube_feed;

pub use youtube_api::YouTubeApiProvider;
pub use youtube_feed::YouTubeFeedProvider;

/// Public watch page for a video.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Decode the handful of HTML entities the search API leaves in titles.
pub fn unescape_html(text: &str) -> String {
    text.replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
