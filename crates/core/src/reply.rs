use regex::Regex;

pub const RUNNING_REPLY: &str = "Yes I'm running";
pub const FALLBACK_REPLY: &str = "I did not understand you!";

/// Probed in this order; the first hit wins.
pub const KEYWORDS: [&str; 4] = ["alive", "up", "running", "hello"];

/// The part of an inbound post the reply engine looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InboundMessage<'a> {
    pub post_id: &'a str,
    pub user_id: &'a str,
    pub text: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: &'static str,
    pub root_id: String,
    pub matched_keyword: Option<&'static str>,
}

pub struct ReplyEngine {
    patterns: Vec<(&'static str, Regex)>,
}

impl ReplyEngine {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = KEYWORDS
            .iter()
            .map(|keyword| Ok((*keyword, keyword_pattern(keyword)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }

    /// `None` when the post was written by the bot itself.
    pub fn reply_to(&self, message: &InboundMessage<'_>, bot_user_id: &str) -> Option<Reply> {
        if message.user_id == bot_user_id {
            return None;
        }

        let matched_keyword = self.matched_keyword(message.text);
        Some(Reply {
            text: if matched_keyword.is_some() { RUNNING_REPLY } else { FALLBACK_REPLY },
            root_id: message.post_id.to_owned(),
            matched_keyword,
        })
    }

    pub fn matched_keyword(&self, text: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(keyword, _)| *keyword)
    }
}

// `\W` here is the ASCII notion of a non-word character.
fn keyword_pattern(keyword: &str) -> Result<Regex, regex::Error> {
    const NON_WORD: &str = "[^0-9A-Za-z_]";
    Regex::new(&format!("(?:^|{NON_WORD}){}(?:$|{NON_WORD})", regex::escape(keyword)))
}
