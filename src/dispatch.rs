//! Command dispatcher
//!
//! Inspects each chat line from a logged-in session and routes it: a
//! recognized `!`-command goes to the matching collaborator and answers the
//! asker directly; everything else takes the default path, a sentiment-tagged
//! chat message sent back to the sender and broadcast to everyone else.
//!
//! Collaborator faults stop here. Whatever goes wrong inside a collaborator
//! becomes a direct `error` envelope for that one request.

use tracing::warn;

use crate::broadcast::Broadcaster;
use crate::envelope::{Envelope, Sentiment};
use crate::nlp::NlpServices;
use crate::session::Session;

/// Entities scoring below this are dropped from `!ner` output
const NER_SCORE_THRESHOLD: f64 = 0.85;

const TRANSLATE_USAGE: &str = "Usage: !translate <lang> <text>";
const GENERATE_USAGE: &str = "Usage: !generate <prompt>";
const NER_USAGE: &str = "Usage: !ner <text>";

/// A recognized command parsed out of a chat line
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Translate { lang: &'a str, text: &'a str },
    Generate { prompt: &'a str },
    ExtractEntities { text: &'a str },
}

/// Parse the leading `!`-verb of a chat line
///
/// Returns `None` when no verb is recognized (the default sentiment path),
/// and `Some(Err(usage))` when a verb is present but its arguments are
/// malformed.
fn parse_command(text: &str) -> Option<Result<Command<'_>, &'static str>> {
    let trimmed = text.trim();
    let verb = trimmed.split_whitespace().next()?;

    match verb {
        "!translate" => {
            let rest = trimmed[verb.len()..].trim_start();
            match rest.split_once(char::is_whitespace) {
                Some((lang, text)) if !text.trim().is_empty() => Some(Ok(Command::Translate {
                    lang,
                    text: text.trim(),
                })),
                _ => Some(Err(TRANSLATE_USAGE)),
            }
        }
        "!generate" => {
            let prompt = trimmed[verb.len()..].trim();
            if prompt.is_empty() {
                Some(Err(GENERATE_USAGE))
            } else {
                Some(Ok(Command::Generate { prompt }))
            }
        }
        "!ner" => {
            let text = trimmed[verb.len()..].trim();
            if text.is_empty() {
                Some(Err(NER_USAGE))
            } else {
                Some(Ok(Command::ExtractEntities { text }))
            }
        }
        _ => None,
    }
}

fn round_two_places(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Routes chat lines to collaborators and the broadcast fan-out
pub struct Dispatcher {
    nlp: NlpServices,
    broadcaster: Broadcaster,
}

impl Dispatcher {
    /// Create a dispatcher over the given collaborators and broadcaster
    pub fn new(nlp: NlpServices, broadcaster: Broadcaster) -> Self {
        Self { nlp, broadcaster }
    }

    /// Route one chat line from a logged-in session
    ///
    /// Command responses and errors go to the sender only; the default path
    /// sends the sentiment-tagged message to the sender and broadcasts it to
    /// all other sessions. Send failures are ignored here; the lifecycle
    /// task discovers the dead connection through its own channel.
    pub async fn dispatch(&self, sender: &Session, text: &str) {
        match parse_command(text) {
            Some(Err(usage)) => {
                let _ = sender.send(Envelope::error(usage)).await;
            }
            Some(Ok(Command::Translate { lang, text })) => {
                match self.nlp.translator.translate(lang, text).await {
                    Ok(translation) => {
                        let _ = sender.send(Envelope::response(translation)).await;
                    }
                    Err(e) => {
                        warn!("Translation failed for {}: {}", sender.username, e);
                        let _ = sender
                            .send(Envelope::error(format!("Translation failed: {}", e)))
                            .await;
                    }
                }
            }
            Some(Ok(Command::Generate { prompt })) => {
                match self.nlp.generator.generate(prompt).await {
                    Ok(generated) => {
                        let _ = sender.send(Envelope::response(generated)).await;
                    }
                    Err(e) => {
                        warn!("Generation failed for {}: {}", sender.username, e);
                        let _ = sender
                            .send(Envelope::error(format!("Generation failed: {}", e)))
                            .await;
                    }
                }
            }
            Some(Ok(Command::ExtractEntities { text })) => {
                match self.nlp.entities.extract_entities(text).await {
                    Ok(entities) => {
                        let found: Vec<String> = entities
                            .iter()
                            .filter(|e| e.score >= NER_SCORE_THRESHOLD)
                            .map(|e| format!("{} ({})", e.text, e.group))
                            .collect();
                        let message = if found.is_empty() {
                            "No entities found.".to_string()
                        } else {
                            found.join(", ")
                        };
                        let _ = sender.send(Envelope::response(message)).await;
                    }
                    Err(e) => {
                        warn!("Entity extraction failed for {}: {}", sender.username, e);
                        let _ = sender
                            .send(Envelope::error(format!("Entity extraction failed: {}", e)))
                            .await;
                    }
                }
            }
            None => match self.nlp.sentiment.classify(text).await {
                Ok(sentiment) => {
                    let sentiment = Sentiment {
                        label: sentiment.label,
                        score: round_two_places(sentiment.score),
                    };
                    let envelope = Envelope::chat(&sender.username, text, sentiment);
                    let _ = sender.send(envelope.clone()).await;
                    self.broadcaster.broadcast(&envelope, Some(sender.id)).await;
                }
                Err(e) => {
                    warn!("Sentiment analysis failed for {}: {}", sender.username, e);
                    let _ = sender
                        .send(Envelope::error(format!("Sentiment analysis failed: {}", e)))
                        .await;
                }
            },
        }
    }
}
