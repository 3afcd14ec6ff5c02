//! Message personalization: placeholder substitution and greeting selection.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::recipients::Recipient;

/// Placeholders replaced with the recipient's name.
pub const NAME_TOKENS: [&str; 2] = ["[NAME]", "[الاسم]"];

/// Placeholders replaced with a randomly drawn greeting.
pub const GREETING_TOKENS: [&str; 2] = ["[GREETING]", "[التحية]"];

/// Built-in greeting pool.
pub const DEFAULT_GREETINGS: [&str; 9] = [
    "حيّاك الله",
    "السلام عليكم و رحمة الله و بركاته",
    "يسعد أوقاتك",
    "تحية طيبة",
    "يعطيك العافية",
    "يسعد أيامك",
    "يا هلا",
    "أهلًا",
    "السلام عليكم",
];

/// Pick one greeting uniformly at random. Returns `""` for an empty pool.
pub fn pick_greeting<'a, S, R>(pool: &'a [S], rng: &mut R) -> &'a str
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    pool.choose(rng).map(|g| g.as_ref()).unwrap_or("")
}

/// Substitute every name and greeting placeholder in `template`.
///
/// Replacement is literal; tokens missing from the template are left alone.
pub fn personalize(template: &str, recipient: &Recipient, greeting: &str) -> String {
    // Greetings first: the name is inserted last so it is never rescanned.
    let mut message = template.to_string();
    for token in GREETING_TOKENS {
        if message.contains(token) {
            message = message.replace(token, greeting);
        }
    }
    for token in NAME_TOKENS {
        if message.contains(token) {
            message = message.replace(token, &recipient.name);
        }
    }
    message
}

/// Renders one template for many recipients against a greeting pool.
#[derive(Debug, Clone, Copy)]
pub struct Personalizer<'a> {
    template: &'a str,
    greetings: &'a [String],
}

impl<'a> Personalizer<'a> {
    pub fn new(template: &'a str, greetings: &'a [String]) -> Self {
        Self {
            template,
            greetings,
        }
    }

    /// Whether the template asks for a greeting at all.
    pub fn wants_greeting(&self) -> bool {
        GREETING_TOKENS.iter().any(|t| self.template.contains(t))
    }

    /// Produce the final text for `recipient`, drawing a fresh greeting.
    pub fn render<R: Rng + ?Sized>(&self, recipient: &Recipient, rng: &mut R) -> String {
        let greeting = if self.wants_greeting() {
            pick_greeting(self.greetings, rng)
        } else {
            ""
        };
        personalize(self.template, recipient, greeting)
    }
}
