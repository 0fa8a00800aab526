//! Filling a generated code into a page.
//!
//! The page is a flat snapshot of its `<input>`-like elements in document
//! order. Locating the target field is delegated to a [`FieldMatcher`]; the
//! default [`HeuristicMatcher`] tries OTP-specific selectors, then the
//! focused input, then the first visible text-like input.

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const NO_FIELD_REASON: &str = "No suitable input field found.";
pub const STALE_MATCH_REASON: &str = "Matched field is no longer on the page.";

const TEXT_LIKE: [&str; 3] = ["text", "number", "tel"];

/// Snapshot keys follow DOM property names (`readOnly`, not `read_only`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct InputField {
    pub tag: String,
    /// The declared `type` attribute, if any.
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub autocomplete: Option<String>,
    pub visible: bool,
    pub disabled: bool,
    pub read_only: bool,
    pub focused: bool,
    pub value: String,
}

impl InputField {
    pub fn input(input_type: Option<&str>) -> Self {
        Self {
            tag: "input".to_string(),
            input_type: input_type.map(str::to_string),
            visible: true,
            ..Default::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn is_input(&self) -> bool {
        self.tag.eq_ignore_ascii_case("input")
    }

    /// What a browser reports as `type`: `text` when undeclared.
    pub fn effective_type(&self) -> String {
        self.input_type
            .as_deref()
            .unwrap_or("text")
            .to_ascii_lowercase()
    }

    pub fn is_editable(&self) -> bool {
        !self.disabled && !self.read_only
    }

    fn is_usable(&self) -> bool {
        self.visible && self.is_editable()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    #[serde(default)]
    pub fields: Vec<InputField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Selector(usize),
    Focused,
    FirstVisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMatch {
    pub index: usize,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillOutcome {
    pub filled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Picks the field a code should go into.
pub trait FieldMatcher {
    fn locate(&self, page: &Page) -> Option<FieldMatch>;
}

#[derive(Debug, Clone, Copy)]
enum Attr {
    Name,
    Id,
    Autocomplete,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Equals,
    Contains,
}

/// `input[type="..."][attr op "value"]`
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    input_type: Option<&'static str>,
    attr: Attr,
    op: Op,
    value: &'static str,
}

impl Selector {
    const fn new(input_type: Option<&'static str>, attr: Attr, op: Op, value: &'static str) -> Self {
        Self {
            input_type,
            attr,
            op,
            value,
        }
    }

    pub fn matches(&self, field: &InputField) -> bool {
        if !field.is_input() {
            return false;
        }
        if let Some(t) = self.input_type {
            // attribute selectors only see a declared type
            if field.input_type.as_deref() != Some(t) {
                return false;
            }
        }
        let attr = match self.attr {
            Attr::Name => field.name.as_deref(),
            Attr::Id => field.id.as_deref(),
            Attr::Autocomplete => field.autocomplete.as_deref(),
        };
        match (attr, self.op) {
            (Some(v), Op::Equals) => v == self.value,
            (Some(v), Op::Contains) => v.contains(self.value),
            (None, _) => false,
        }
    }
}

pub const OTP_SELECTORS: [Selector; 9] = [
    Selector::new(Some("text"), Attr::Name, Op::Contains, "otp"),
    Selector::new(Some("number"), Attr::Name, Op::Contains, "otp"),
    Selector::new(Some("text"), Attr::Name, Op::Contains, "token"),
    Selector::new(Some("number"), Attr::Name, Op::Contains, "token"),
    Selector::new(Some("text"), Attr::Autocomplete, Op::Equals, "one-time-code"),
    Selector::new(Some("tel"), Attr::Autocomplete, Op::Equals, "one-time-code"),
    Selector::new(None, Attr::Name, Op::Equals, "code"),
    Selector::new(None, Attr::Id, Op::Contains, "otp"),
    Selector::new(None, Attr::Id, Op::Contains, "token"),
];

#[derive(Debug, Clone)]
pub struct HeuristicMatcher {
    selectors: Vec<Selector>,
}

impl Default for HeuristicMatcher {
    fn default() -> Self {
        Self {
            selectors: OTP_SELECTORS.to_vec(),
        }
    }
}

impl FieldMatcher for HeuristicMatcher {
    fn locate(&self, page: &Page) -> Option<FieldMatch> {
        // like querySelector: only the first hit per selector is considered
        for (n, selector) in self.selectors.iter().enumerate() {
            if let Some(index) = page.fields.iter().position(|f| selector.matches(f)) {
                if page.fields[index].is_usable() {
                    return Some(FieldMatch {
                        index,
                        tier: MatchTier::Selector(n),
                    });
                }
            }
        }

        if let Some(index) = page.fields.iter().position(|f| {
            f.focused
                && f.is_input()
                && TEXT_LIKE.contains(&f.effective_type().as_str())
                && f.is_editable()
        }) {
            return Some(FieldMatch {
                index,
                tier: MatchTier::Focused,
            });
        }

        page.fields
            .iter()
            .position(|f| {
                f.is_input()
                    && f.input_type
                        .as_deref()
                        .is_some_and(|t| TEXT_LIKE.contains(&t))
                    && f.is_usable()
            })
            .map(|index| FieldMatch {
                index,
                tier: MatchTier::FirstVisible,
            })
    }
}

pub struct AutofillDispatcher<M: FieldMatcher = HeuristicMatcher> {
    matcher: M,
}

impl Default for AutofillDispatcher<HeuristicMatcher> {
    fn default() -> Self {
        Self::new(HeuristicMatcher::default())
    }
}

impl<M: FieldMatcher> AutofillDispatcher<M> {
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }

    /// Writes `code` into the located field. Best effort, no retries.
    pub fn fill(&self, code: &str, page: &mut Page) -> FillOutcome {
        let Some(found) = self.matcher.locate(page) else {
            debug!(fields = page.fields.len(), "no field to fill");
            return FillOutcome {
                filled: false,
                reason: Some(NO_FIELD_REASON.to_string()),
            };
        };

        let Some(field) = page.fields.get_mut(found.index) else {
            debug!(index = found.index, fields = page.fields.len(), "matcher index out of range");
            return FillOutcome {
                filled: false,
                reason: Some(STALE_MATCH_REASON.to_string()),
            };
        };
        field.value = code.to_string();
        // the weakest tier may have picked an unrelated field, leave focus alone
        if matches!(found.tier, MatchTier::Selector(_)) {
            for (i, f) in page.fields.iter_mut().enumerate() {
                f.focused = i == found.index;
            }
        }
        debug!(index = found.index, tier = ?found.tier, "code filled");
        FillOutcome {
            filled: true,
            reason: None,
        }
    }
}
