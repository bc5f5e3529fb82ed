use crate::models::SourceKind;

/// Best-effort classification of a raw submission by length and shape.
///
/// Texts over 500 characters read like pasted articles. Shorter texts that
/// carry an @-mention or stay under 300 characters look like tweets.
/// Everything in between is treated as a loose idea.
pub fn classify(text: &str) -> SourceKind {
    if text.chars().count() > 500 {
        SourceKind::Article
    } else if text.contains('@') || text.chars().count() < 300 {
        SourceKind::Tweet
    } else {
        SourceKind::Idea
    }
}

#[cfg(test)]
mod tests {
    use super::classify;
    use crate::models::SourceKind;

    #[test]
    fn long_text_is_an_article() {
        let text = "a".repeat(501);
        assert_eq!(classify(&text), SourceKind::Article);
    }

    #[test]
    fn short_text_is_a_tweet() {
        assert_eq!(classify("shipping beats perfection"), SourceKind::Tweet);
    }

    #[test]
    fn mention_is_a_tweet_even_at_mid_length() {
        let mut text = "x".repeat(350);
        text.push_str(" @someone");
        assert_eq!(classify(&text), SourceKind::Tweet);
    }

    #[test]
    fn mid_length_text_without_mention_is_an_idea() {
        let text = "y".repeat(400);
        assert_eq!(classify(&text), SourceKind::Idea);
    }

    #[test]
    fn boundary_at_500_stays_below_article() {
        let text = "z".repeat(500);
        assert_ne!(classify(&text), SourceKind::Article);
    }
}
