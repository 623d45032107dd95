//! Rewriting the terms and writing the footer note with a text-generation model.

use std::cell::Cell;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::ServiceError;

pub const FALLBACK_NOTE: &str = "Thank you for your business.";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Anything that turns a prompt into text.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// The two document-level requests, with their different failure policies.
///
/// Each request is guarded while in flight. Calls are blocking, so the guard
/// only trips when a generator re-enters the same assistant before returning.
pub struct Assistant<G> {
    generator: G,
    polishing: Cell<bool>,
    writing_note: Cell<bool>,
}

impl<G: TextGenerator> Assistant<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            polishing: Cell::new(false),
            writing_note: Cell::new(false),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Rewords contract terms. Any fault is returned to the caller; an empty
    /// reply gives back `text` unchanged.
    pub fn polish(&self, text: &str) -> Result<String, ServiceError> {
        let _pending = Pending::start(&self.polishing, "terms polish")?;
        match self.generator.generate(&polish_prompt(text)) {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    Ok(text.to_string())
                } else {
                    Ok(reply.to_string())
                }
            }
            Err(e) => {
                error!("Error polishing text: {}", e);
                Err(e)
            }
        }
    }

    /// A short thank-you note. Never fails: any fault yields [`FALLBACK_NOTE`].
    pub fn generate_note(&self, client_name: &str, company_name: &str) -> String {
        let result = Pending::start(&self.writing_note, "note generation")
            .and_then(|_pending| self.generator.generate(&note_prompt(client_name, company_name)));
        match result {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                error!("Error generating note: {}", e);
                FALLBACK_NOTE.to_string()
            }
        }
    }
}

// Marks an action as in flight until dropped.
struct Pending<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> Pending<'a> {
    fn start(flag: &'a Cell<bool>, action: &'static str) -> Result<Self, ServiceError> {
        if flag.replace(true) {
            return Err(ServiceError::Busy(action));
        }
        Ok(Self { flag })
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

fn polish_prompt(text: &str) -> String {
    format!(
        "You are a professional legal consultant for a high-end financial education and funding company.\n\
         Reword the following text to sound professional, legally robust, and authoritative, suitable for a formal invoice or quotation contract.\n\
         Keep the core meaning exactly the same, especially regarding the refund conditions (3 failed challenges despite following rules).\n\
         Do not add markdown formatting like bolding or headers unless appropriate for a contract clause.\n\n\
         Raw Text: \"{}\"",
        text
    )
}

fn note_prompt(client_name: &str, company_name: &str) -> String {
    format!(
        "Write a short, professional, and motivating thank you note for a trading student named {} from the company {}.\n\
         It should appear at the bottom of an invoice. Max 2 sentences.",
        client_name, company_name
    )
}

//=========================================================================================
// Gemini HTTP adapter
//=========================================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Calls the Gemini `generateContent` endpoint. The key is only checked when a
/// request is made.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_key,
            api_base: api_base.into(),
            model: model.into(),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ServiceError::MissingCredential)?;

        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        debug!(model = %self.model, "requesting generated text");
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: GenerateResponse = response.json()?;
        Ok(parsed.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};

    struct Canned {
        reply: Result<&'static str, ()>,
        prompts: RefCell<Vec<String>>,
    }

    impl Canned {
        fn ok(reply: &'static str) -> Self {
            Self {
                reply: Ok(reply),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for Canned {
        fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.reply
                .map(str::to_string)
                .map_err(|_| ServiceError::Unexpected("offline".into()))
        }
    }

    #[test]
    fn polish_trims_reply_and_quotes_input() {
        let assistant = Assistant::new(Canned::ok("  Formal terms.\n"));
        assert_eq!(assistant.polish("no refunds").unwrap(), "Formal terms.");
        let prompts = assistant.generator().prompts.borrow();
        assert!(prompts[0].contains("Raw Text: \"no refunds\""));
    }

    #[test]
    fn polish_keeps_text_on_empty_reply() {
        let assistant = Assistant::new(Canned::ok("   "));
        assert_eq!(assistant.polish("keep me").unwrap(), "keep me");
    }

    #[test]
    fn polish_propagates_faults() {
        let assistant = Assistant::new(Canned::failing());
        assert!(assistant.polish("terms").is_err());
    }

    #[test]
    fn note_falls_back_on_fault() {
        let assistant = Assistant::new(Canned::failing());
        assert_eq!(assistant.generate_note("Ann", "Acme"), FALLBACK_NOTE);
    }

    #[test]
    fn note_mentions_both_parties() {
        let assistant = Assistant::new(Canned::ok("Thanks, Ann!"));
        assert_eq!(assistant.generate_note("Ann", "Acme"), "Thanks, Ann!");
        let prompts = assistant.generator().prompts.borrow();
        assert!(prompts[0].contains("named Ann from the company Acme"));
    }

    #[test]
    fn duplicate_requests_are_rejected_while_pending() {
        let flag = Cell::new(false);
        let first = Pending::start(&flag, "terms polish").unwrap();
        assert!(matches!(
            Pending::start(&flag, "terms polish"),
            Err(ServiceError::Busy("terms polish"))
        ));
        drop(first);
        assert!(Pending::start(&flag, "terms polish").is_ok());
    }

    // Calls back into its own assistant while the outer request is running.
    struct Reentrant {
        me: Weak<Assistant<Reentrant>>,
        inner_polish: RefCell<Option<Result<String, ServiceError>>>,
        inner_note: RefCell<Option<String>>,
    }

    impl TextGenerator for Reentrant {
        fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
            let Some(me) = self.me.upgrade() else {
                return Ok("orphaned".into());
            };
            if prompt.contains("Raw Text") {
                *self.inner_polish.borrow_mut() = Some(me.polish("again"));
            } else {
                *self.inner_note.borrow_mut() = Some(me.generate_note("Ann", "Acme"));
            }
            Ok("outer".into())
        }
    }

    fn reentrant() -> Rc<Assistant<Reentrant>> {
        Rc::new_cyclic(|me| {
            Assistant::new(Reentrant {
                me: me.clone(),
                inner_polish: RefCell::new(None),
                inner_note: RefCell::new(None),
            })
        })
    }

    #[test]
    fn reentrant_polish_is_busy() {
        let assistant = reentrant();
        assert_eq!(assistant.polish("terms").unwrap(), "outer");
        assert!(matches!(
            assistant.generator().inner_polish.borrow_mut().take(),
            Some(Err(ServiceError::Busy("terms polish")))
        ));
        // released once the outer call returned
        assert_eq!(assistant.polish("terms").unwrap(), "outer");
    }

    #[test]
    fn reentrant_note_gets_fallback() {
        let assistant = reentrant();
        assert_eq!(assistant.generate_note("Ann", "Acme"), "outer");
        assert_eq!(
            assistant.generator().inner_note.borrow().as_deref(),
            Some(FALLBACK_NOTE)
        );
    }

    #[test]
    fn missing_key_fails_at_call_time() {
        let client = GeminiClient::new(None, DEFAULT_API_BASE, DEFAULT_MODEL);
        assert!(!client.has_credential());
        assert!(matches!(
            client.generate("hello"),
            Err(ServiceError::MissingCredential)
        ));
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"there"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), "Hello there");
        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let client = GeminiClient::new(Some("k".into()), "https://example.test/v1beta/", "m");
        assert_eq!(client.endpoint(), "https://example.test/v1beta/models/m:generateContent");
    }
}
