use gazette_common::models::{Content, Topic};

pub const DEFAULT_SUBJECT_PREFIX: &str = "Newsletter";

/// Subject and body for one issue, identical for every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject: String,
    pub body: String,
}

/// Build the message for `content`.
///
/// Transports that send bodies verbatim get a plain header naming the topic
/// and a footer explaining why the reader received it. Templating providers
/// get the content text untouched.
pub fn compose(topic: &Topic, content: &Content, prefix: &str, template_free: bool) -> ComposedMessage {
    let subject = format!("{prefix}: {}", topic.name);

    let body = if template_free {
        let rule = "=".repeat(topic.name.chars().count());
        format!(
            "{name}\n{rule}\n\n{text}\n\n-- \nYou are receiving this because you subscribed to \"{name}\".\n",
            name = topic.name,
            text = content.content_text.trim_end(),
        )
    } else {
        content.content_text.clone()
    };

    ComposedMessage { subject, body }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gazette_common::models::{ContentId, TopicId};
    use pretty_assertions::assert_eq;

    use super::*;

    fn fixtures() -> (Topic, Content) {
        let now = Utc::now();
        (
            Topic {
                id: TopicId(1),
                name: "weekly-digest".to_string(),
                description: None,
            },
            Content {
                id: ContentId(1),
                topic_id: TopicId(1),
                content_text: "<p>This week in Rust</p>\n".to_string(),
                scheduled_time: now,
                delivered: false,
                created_at: now,
                claimed_at: None,
                delivered_at: None,
            },
        )
    }

    #[test]
    fn test_templated_transport_gets_raw_text() {
        let (topic, content) = fixtures();
        let message = compose(&topic, &content, DEFAULT_SUBJECT_PREFIX, false);

        assert_eq!(message.subject, "Newsletter: weekly-digest");
        assert_eq!(message.body, "<p>This week in Rust</p>\n");
    }

    #[test]
    fn test_template_free_transport_gets_header_and_footer() {
        let (topic, content) = fixtures();
        let message = compose(&topic, &content, "Digest", true);

        assert_eq!(message.subject, "Digest: weekly-digest");
        assert_eq!(
            message.body,
            "weekly-digest\n=============\n\n<p>This week in Rust</p>\n\n-- \n\
             You are receiving this because you subscribed to \"weekly-digest\".\n"
        );
    }
}
