//! Caption and text message rendering
//!
//! Builds Telegram HTML from item metadata. Limits apply to the visible
//! text in UTF-16 code units, so lengths are measured on the unescaped lines
//! and markup is added afterwards.

use crate::item::Item;
use crate::utils::{truncate_with_ellipsis, utf16_len};
use html_escape::encode_text;

/// Telegram caption limit for media messages
pub const CAPTION_LIMIT: usize = 1024;
/// Telegram limit for text messages
pub const TEXT_LIMIT: usize = 4096;

const AUTHOR_PREFIX: &str = "👤 by ";
const TAGS_PREFIX: &str = "🏷️ ";
const COMMUNITY_PREFIX: &str = "📍 ";

#[derive(Debug, Clone)]
struct CaptionParts {
    title: String,
    author: String,
    score: Option<i64>,
    community: Option<String>,
    tags: String,
    permalink: String,
}

impl CaptionParts {
    fn from_item(item: &Item) -> Self {
        Self {
            title: item.title_or_missing().to_string(),
            author: item.author_or_missing().to_string(),
            score: item.score,
            community: item
                .community
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            tags: item
                .tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            permalink: item.permalink_or_missing().to_string(),
        }
    }

    fn score_line(&self) -> Option<String> {
        self.score.map(|s| format!("👍 {s} upvotes"))
    }

    fn visible_lines(&self) -> Vec<String> {
        let mut lines = vec![
            self.title.clone(),
            format!("{AUTHOR_PREFIX}{}", self.author),
        ];
        lines.extend(self.score_line());
        if let Some(community) = &self.community {
            lines.push(format!("{COMMUNITY_PREFIX}{community}"));
        }
        if !self.tags.is_empty() {
            lines.push(format!("{TAGS_PREFIX}{}", self.tags));
        }
        lines.push(self.permalink.clone());
        lines
    }

    fn visible_len(&self) -> usize {
        let lines = self.visible_lines();
        lines.iter().map(|l| utf16_len(l)).sum::<usize>() + lines.len().saturating_sub(1)
    }

    fn render_html(&self) -> String {
        let mut lines = vec![
            format!("<b>{}</b>", encode_text(&self.title)),
            format!("{AUTHOR_PREFIX}<code>{}</code>", encode_text(&self.author)),
        ];
        lines.extend(self.score_line());
        if let Some(community) = &self.community {
            lines.push(format!("{COMMUNITY_PREFIX}{}", encode_text(community)));
        }
        if !self.tags.is_empty() {
            lines.push(format!("{TAGS_PREFIX}{}", encode_text(&self.tags)));
        }
        lines.push(format!("<code>{}</code>", encode_text(&self.permalink)));
        lines.join("\n")
    }

    /// Shrink `field` by the current overflow, never below `floor` units.
    fn shrink(&mut self, field: Field, limit: usize, floor: usize) {
        let overflow = self.visible_len().saturating_sub(limit);
        if overflow == 0 {
            return;
        }
        let value = match field {
            Field::Title => &mut self.title,
            Field::Tags => &mut self.tags,
            Field::Author => &mut self.author,
            Field::Permalink => &mut self.permalink,
        };
        let target = utf16_len(value).saturating_sub(overflow).max(floor);
        *value = truncate_with_ellipsis(value, target);
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Tags,
    Author,
    Permalink,
}

/// Render the HTML caption for `item` within `limit` visible UTF-16 units.
///
/// When over the limit the title is shortened first, then the tags, each at
/// a grapheme boundary and marked with `…`.
#[must_use]
pub fn format_caption(item: &Item, limit: usize) -> String {
    let mut parts = CaptionParts::from_item(item);
    if let Some(community) = parts.community.take() {
        parts.community = Some(truncate_with_ellipsis(&community, 64));
    }

    parts.shrink(Field::Title, limit, 1);
    parts.shrink(Field::Tags, limit, 0);
    parts.shrink(Field::Author, limit, 1);
    parts.shrink(Field::Permalink, limit, 1);

    parts.render_html()
}

/// Caption for media messages
#[must_use]
pub fn media_caption(item: &Item) -> String {
    format_caption(item, CAPTION_LIMIT)
}

/// Body of the text fallback message
#[must_use]
pub fn text_message(item: &Item) -> String {
    format_caption(item, TEXT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use proptest::prelude::*;

    fn visible_len(item: &Item, limit: usize) -> usize {
        let html = format_caption(item, limit);
        let stripped = lazy_regex::regex_replace_all!(r"</?(?:b|code)>", &html, "");
        utf16_len(&html_escape::decode_html_entities(&stripped))
    }

    fn reddit_item() -> Item {
        let mut item = Item::new("t3_abc");
        item.title = Some("Sunset over <the> bay & harbour".to_string());
        item.author = Some("photo_fan".to_string());
        item.permalink = Some("https://reddit.com/r/pics/comments/abc/".to_string());
        item.score = Some(1234);
        item.community = Some("r/pics".to_string());
        item
    }

    #[test]
    fn test_reddit_caption_snapshot() {
        assert_snapshot!("reddit_caption", media_caption(&reddit_item()));
    }

    #[test]
    fn test_missing_fields_render_sentinel() {
        let caption = media_caption(&Item::new("bare"));
        assert_eq!(
            caption,
            "<b>N/A</b>\n👤 by <code>N/A</code>\n<code>N/A</code>"
        );
    }

    #[test]
    fn test_long_title_is_cut_first() {
        let mut item = reddit_item();
        item.title = Some("word ".repeat(400));
        item.tags = vec!["alpha".to_string(), "beta".to_string()];

        let caption = media_caption(&item);
        assert!(visible_len(&item, CAPTION_LIMIT) <= CAPTION_LIMIT);
        assert!(caption.contains("…</b>"));
        assert!(caption.contains("alpha, beta"));
        assert!(caption.contains("<code>https://reddit.com/r/pics/comments/abc/</code>"));
    }

    #[test]
    fn test_tags_cut_after_title() {
        let mut item = reddit_item();
        item.tags = (0..800).map(|i| format!("tag{i}")).collect();

        let caption = media_caption(&item);
        assert!(visible_len(&item, CAPTION_LIMIT) <= CAPTION_LIMIT);
        assert!(caption.contains("🏷️ tag0, tag1"));
        assert!(caption.contains('…'));
    }

    #[test]
    fn test_emoji_caption_fits_telegram_units() {
        let mut item = reddit_item();
        item.title = Some("🔥 hot take ".repeat(120));
        item.tags = vec!["🎉party".to_string(), "news".to_string()];

        let len = visible_len(&item, CAPTION_LIMIT);
        assert!(len <= CAPTION_LIMIT, "utf16 len {len}");
        assert!(len >= CAPTION_LIMIT - 2, "title cut too short: {len}");
        assert!(media_caption(&item).contains("🏷️ 🎉party, news"));
    }

    #[test]
    fn test_text_limit_is_larger() {
        let mut item = reddit_item();
        item.title = Some("x".repeat(2000));
        assert!(text_message(&item).contains(&"x".repeat(2000)));
        assert!(!media_caption(&item).contains(&"x".repeat(2000)));
    }

    proptest! {
        #[test]
        fn prop_caption_within_limit(
            title in "[\\PC😀🔥]{0,1500}",
            author in "\\PC{0,300}",
            tags in proptest::collection::vec("[a-z&<>🎉]{1,30}", 0..80),
            limit in prop_oneof![Just(CAPTION_LIMIT), Just(TEXT_LIMIT)],
        ) {
            let mut item = reddit_item();
            item.title = Some(title);
            item.author = Some(author);
            item.tags = tags;
            prop_assert!(visible_len(&item, limit) <= limit);
        }
    }
}
