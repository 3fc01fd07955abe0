//!
//! This module matches windows against the configured tag rules and derives where a new window should go.
//!
//! Every rule owns one tag bit. A window collects the bits of all rules matching its properties, together with the flags, type and placement overrides of those rules.
use core::fmt;
use regex::Regex;
use thiserror::Error;

use crate::{
    client::{ClientType, ModeFlags, PolicyFlags},
    config::{TagConfig, ViewConfig},
    geometry::{GravityCatalog, Rect},
};

/// The maximum number of tags, one per bit of the mask.
pub const MAX_TAGS: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
/// A bitmask of tag indices.
pub struct Tags(pub u32);

impl Tags {
    /// The tag every window falls back to when no rule matched.
    pub const DEFAULT: Self = Self(1);
    pub const NONE: Self = Self(0);

    /// Creates a mask holding a single tag. Indices past the limit give an empty mask.
    #[must_use]
    pub const fn single(index: usize) -> Self {
        if index < MAX_TAGS {
            Self(1 << index)
        } else {
            Self::NONE
        }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn has(self, index: usize) -> bool {
        self.intersects(Self::single(index))
    }

    #[must_use]
    pub const fn with(self, index: usize) -> Self {
        Self(self.0 | Self::single(index).0)
    }

    #[must_use]
    pub const fn without(self, index: usize) -> Self {
        Self(self.0 & !Self::single(index).0)
    }

    /// Iterates over the set tag indices in ascending order.
    pub fn indices(self) -> impl Iterator<Item = usize> {
        (0..MAX_TAGS).filter(move |&i| self.has(i))
    }
}

impl fmt::Debug for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.indices()).finish()
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// The window properties a rule pattern is matched against.
    pub struct MatchFields: u8 {
        const CLASS = 1 << 0;
        const INSTANCE = 1 << 1;
        const NAME = 1 << 2;
        const ROLE = 1 << 3;
    }
}

impl Default for MatchFields {
    fn default() -> Self {
        Self::CLASS | Self::INSTANCE
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
/// The identifying properties of a window.
pub struct WindowProps {
    pub class: String,
    pub instance: String,
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Error)]
/// A reason why a tag rule or view couldn't be compiled.
pub enum RuleError {
    #[error("invalid pattern for {name}: {source}")]
    Pattern { name: String, source: regex::Error },
    #[error("unknown gravity {gravity} in tag {name}")]
    UnknownGravity { name: String, gravity: String },
    #[error("unknown match field {field} in tag {name}")]
    UnknownField { name: String, field: String },
    #[error("tag {0} exceeds the limit of {limit} tags", limit = MAX_TAGS)]
    TooManyTags(String),
}

#[derive(Clone, PartialEq, Debug, Default)]
/// The flags and placement overrides a rule attaches to matching windows.
pub struct RuleBundle {
    pub client_type: Option<ClientType>,
    pub modes: ModeFlags,
    pub policy: PolicyFlags,
    pub geometry: Option<Rect>,
    pub gravity: Option<usize>,
    pub screen: Option<usize>,
}

#[derive(Clone, Debug)]
/// A compiled tag rule.
pub struct TagRule {
    pub name: String,
    /// A rule without a pattern never matches on its own, windows only get its tag explicitly.
    pub matcher: Option<Regex>,
    pub fields: MatchFields,
    pub bundle: RuleBundle,
}

impl TagRule {
    /// Creates a rule that carries a tag but matches nothing.
    #[must_use]
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            matcher: None,
            fields: MatchFields::default(),
            bundle: RuleBundle::default(),
        }
    }

    /// Compiles a rule from its configuration.
    ///
    /// # Errors
    /// Returns an error if the pattern is invalid, or the rule names an unknown gravity or match field.
    pub fn compile(config: &TagConfig, gravities: &GravityCatalog) -> Result<Self, RuleError> {
        let matcher = config
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|source| RuleError::Pattern {
                name: config.name.clone(),
                source,
            })?;

        let fields = if config.fields.is_empty() {
            MatchFields::default()
        } else {
            config
                .fields
                .iter()
                .try_fold(MatchFields::empty(), |acc, field| {
                    let flag = match field.as_str() {
                        "class" => MatchFields::CLASS,
                        "instance" => MatchFields::INSTANCE,
                        "name" => MatchFields::NAME,
                        "role" => MatchFields::ROLE,
                        _ => {
                            return Err(RuleError::UnknownField {
                                name: config.name.clone(),
                                field: field.clone(),
                            });
                        }
                    };
                    Ok(acc | flag)
                })?
        };

        let gravity = match &config.gravity {
            Some(name) => Some(gravities.find(name).ok_or_else(|| {
                RuleError::UnknownGravity {
                    name: config.name.clone(),
                    gravity: name.clone(),
                }
            })?),
            None => None,
        };

        let mut modes = ModeFlags::empty();
        modes.set(ModeFlags::FLOAT, config.float);
        modes.set(ModeFlags::FULL, config.full);
        modes.set(ModeFlags::STICK, config.stick);
        modes.set(ModeFlags::URGENT, config.urgent);
        modes.set(ModeFlags::RESIZE_LOCK, config.resize);

        let mut policy = PolicyFlags::empty();
        policy.set(PolicyFlags::NO_FLOAT, config.no_float);
        policy.set(PolicyFlags::NO_FULL, config.no_full);
        policy.set(PolicyFlags::NO_STICK, config.no_stick);
        policy.set(PolicyFlags::NO_URGENT, config.no_urgent);

        let geometry = config.geometry.map(|[x, y, w, h]| Rect::new(x, y, w, h));
        if geometry.is_some() {
            modes |= ModeFlags::FLOAT | ModeFlags::RESIZE_LOCK;
        }

        Ok(Self {
            name: config.name.clone(),
            matcher,
            fields,
            bundle: RuleBundle {
                client_type: config.window_type,
                modes,
                policy,
                geometry,
                gravity,
                screen: config.screen,
            },
        })
    }

    /// Returns whether the pattern matches any of the configured properties of a window.
    #[must_use]
    pub fn matches(&self, props: &WindowProps) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        (self.fields.contains(MatchFields::CLASS) && matcher.is_match(&props.class))
            || (self.fields.contains(MatchFields::INSTANCE) && matcher.is_match(&props.instance))
            || (self.fields.contains(MatchFields::NAME) && matcher.is_match(&props.name))
            || (self.fields.contains(MatchFields::ROLE)
                && props.role.as_deref().is_some_and(|r| matcher.is_match(r)))
    }
}

/// Compiles every tag rule, dropping the ones that fail with a warning.
///
/// The first rule always carries the default tag. A configured `default` rule without a pattern is moved there, otherwise a plain one is inserted.
#[must_use]
pub fn compile_rules(configs: &[TagConfig], gravities: &GravityCatalog) -> Vec<TagRule> {
    let mut rules: Vec<TagRule> = configs
        .iter()
        .filter_map(|config| {
            TagRule::compile(config, gravities)
                .map_err(|e| log::warn!("dropping tag rule: {e}"))
                .ok()
        })
        .collect();

    let default = rules
        .iter()
        .position(|r| r.name == "default" && r.matcher.is_none())
        .map_or_else(|| TagRule::plain("default"), |i| rules.remove(i));
    rules.insert(0, default);

    if rules.len() > MAX_TAGS {
        for rule in rules.drain(MAX_TAGS..) {
            log::warn!("{}", RuleError::TooManyTags(rule.name));
        }
    }
    rules
}

#[derive(Clone, PartialEq, Eq, Debug)]
/// A named, switchable subset of tags.
pub struct View {
    pub name: String,
    pub tags: Tags,
}

impl View {
    /// Compiles a view, selecting every tag whose name matches its pattern.
    ///
    /// # Errors
    /// Returns an error if the pattern is invalid.
    pub fn compile(config: &ViewConfig, rules: &[TagRule]) -> Result<Self, RuleError> {
        let matcher = Regex::new(&config.tags).map_err(|source| RuleError::Pattern {
            name: config.name.clone(),
            source,
        })?;
        let tags = rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| matcher.is_match(&rule.name))
            .fold(Tags::NONE, |acc, (i, _)| acc.with(i));
        Ok(Self {
            name: config.name.clone(),
            tags,
        })
    }
}

/// Compiles every view, dropping the ones that fail with a warning. An empty result becomes a single view of the default tag.
#[must_use]
pub fn compile_views(configs: &[ViewConfig], rules: &[TagRule]) -> Vec<View> {
    let mut views: Vec<View> = configs
        .iter()
        .filter_map(|config| {
            View::compile(config, rules)
                .map_err(|e| log::warn!("dropping view: {e}"))
                .ok()
        })
        .collect();
    if views.is_empty() {
        views.push(View {
            name: String::from("default"),
            tags: Tags::DEFAULT,
        });
    }
    views
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
/// Placement overrides for a single view.
pub struct Slot {
    pub gravity: Option<usize>,
    pub screen: Option<usize>,
}

#[derive(Clone, PartialEq, Debug, Default)]
/// The aggregated result of matching a window against all rules.
pub struct Routing {
    pub tags: Tags,
    pub modes: ModeFlags,
    pub policy: PolicyFlags,
    pub client_type: Option<ClientType>,
    pub geometry: Option<Rect>,
    /// One entry per view.
    pub slots: Vec<Slot>,
}

/// Matches a window against the rules and aggregates everything the matching rules carry.
///
/// Flags are only ever added. A window no rule matched gets the default tag.
#[must_use]
pub fn route(props: &WindowProps, rules: &[TagRule], views: &[View]) -> Routing {
    let mut routing = Routing::default();

    for (i, rule) in rules.iter().enumerate() {
        if !rule.matches(props) {
            continue;
        }
        log::debug!("tag {} matched class {} instance {}", rule.name, props.class, props.instance);
        routing.tags = routing.tags.with(i);
        routing.modes |= rule.bundle.modes;
        routing.policy |= rule.bundle.policy;
        routing.client_type = routing.client_type.or(rule.bundle.client_type);
        routing.geometry = routing.geometry.or(rule.bundle.geometry);
    }

    if routing.tags.is_empty() {
        routing.tags = Tags::DEFAULT;
    }
    routing.slots = slots(routing.tags, routing.modes, rules, views);
    routing
}

/// Resolves the per-view overrides for a tag mask. For each view the first rule with an override wins.
#[must_use]
pub fn slots(tags: Tags, modes: ModeFlags, rules: &[TagRule], views: &[View]) -> Vec<Slot> {
    let sticky = modes.contains(ModeFlags::STICK);
    views
        .iter()
        .map(|view| {
            let mut slot = Slot::default();
            for (i, rule) in rules.iter().enumerate() {
                if !tags.has(i) || !(sticky || view.tags.has(i)) {
                    continue;
                }
                slot.gravity = slot.gravity.or(rule.bundle.gravity);
                slot.screen = slot.screen.or(rule.bundle.screen);
            }
            slot
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Gravity;

    fn catalog() -> GravityCatalog {
        GravityCatalog::new(vec![
            Gravity::new("top_left", [0, 0, 50, 50]),
            Gravity::new("top", [0, 0, 100, 50]),
            Gravity::new("top_right", [100, 0, 50, 50]),
            Gravity::new("left", [0, 0, 50, 100]),
            Gravity::new("center", [0, 0, 100, 100]),
        ])
    }

    fn tag(name: &str, pattern: Option<&str>) -> TagConfig {
        TagConfig {
            name: name.to_owned(),
            pattern: pattern.map(str::to_owned),
            ..TagConfig::default()
        }
    }

    fn props(class: &str) -> WindowProps {
        WindowProps {
            class: class.to_owned(),
            instance: class.to_lowercase(),
            name: String::from("~"),
            role: None,
        }
    }

    fn view(name: &str, tags: Tags) -> View {
        View {
            name: name.to_owned(),
            tags,
        }
    }

    #[test]
    fn terminal_rule_assigns_tag_and_gravity() {
        let mut term = tag("term", Some("Terminal"));
        term.gravity = Some(String::from("center"));
        let rules = compile_rules(&[tag("default", None), term], &catalog());
        let views = vec![view("work", Tags::single(1))];

        let routing = route(&props("Terminal"), &rules, &views);
        assert_eq!(routing.tags, Tags::single(1));
        assert_eq!(routing.slots[0].gravity, Some(5));
    }

    #[test]
    fn unmatched_windows_get_the_default_tag() {
        let rules = compile_rules(&[tag("default", None), tag("web", Some("firefox"))], &catalog());
        let routing = route(&props("Xterm"), &rules, &[]);
        assert_eq!(routing.tags, Tags::DEFAULT);
        assert!(!routing.tags.is_empty());
    }

    #[test]
    fn flags_accumulate_across_rules() {
        let mut a = tag("a", Some("Gimp"));
        a.float = true;
        let mut b = tag("b", Some("gimp"));
        b.stick = true;
        b.no_full = true;
        let rules = compile_rules(&[tag("default", None), a, b], &catalog());

        let routing = route(&props("Gimp"), &rules, &[]);
        assert_eq!(routing.tags, Tags::single(1).with(2));
        assert_eq!(routing.modes, ModeFlags::FLOAT | ModeFlags::STICK);
        assert_eq!(routing.policy, PolicyFlags::NO_FULL);
    }

    #[test]
    fn fixed_geometry_implies_float_and_resize_lock() {
        let mut fixed = tag("fixed", Some("Mplayer"));
        fixed.geometry = Some([10, 10, 320, 240]);
        let rules = compile_rules(&[fixed], &catalog());

        let routing = route(&props("Mplayer"), &rules, &[]);
        assert!(routing.modes.contains(ModeFlags::FLOAT | ModeFlags::RESIZE_LOCK));
        assert_eq!(routing.geometry, Some(Rect::new(10, 10, 320, 240)));
    }

    #[test]
    fn first_rule_with_an_override_wins_per_view() {
        let mut a = tag("a", Some("Foo"));
        a.gravity = Some(String::from("left"));
        let mut b = tag("b", Some("Foo"));
        b.gravity = Some(String::from("top"));
        b.screen = Some(1);
        let rules = compile_rules(&[tag("default", None), a, b], &catalog());
        let views = vec![
            view("one", Tags::single(1).with(2)),
            view("two", Tags::single(2)),
            view("three", Tags::single(0)),
        ];

        let routing = route(&props("Foo"), &rules, &views);
        assert_eq!(routing.slots[0], Slot { gravity: Some(4), screen: Some(1) });
        assert_eq!(routing.slots[1], Slot { gravity: Some(2), screen: Some(1) });
        assert_eq!(routing.slots[2], Slot::default());
    }

    #[test]
    fn sticky_windows_get_overrides_on_every_view() {
        let mut a = tag("a", Some("Foo"));
        a.gravity = Some(String::from("top_right"));
        a.stick = true;
        let rules = compile_rules(&[tag("default", None), a], &catalog());
        let views = vec![view("one", Tags::single(0)), view("two", Tags::NONE)];

        let routing = route(&props("Foo"), &rules, &views);
        assert!(routing.slots.iter().all(|s| s.gravity == Some(3)));
    }

    #[test]
    fn match_fields_restrict_properties() {
        let mut by_role = tag("role", Some("browser"));
        by_role.fields = vec![String::from("role")];
        let rules = compile_rules(&[by_role], &catalog());

        let mut window = props("browser");
        assert!(!rules[1].matches(&window));
        window.role = Some(String::from("browser"));
        assert!(rules[1].matches(&window));
    }

    #[test]
    fn broken_rules_are_dropped() {
        let mut unknown = tag("unknown", Some("x"));
        unknown.gravity = Some(String::from("nowhere"));
        let mut field = tag("field", Some("x"));
        field.fields = vec![String::from("colour")];

        assert!(matches!(
            TagRule::compile(&tag("bad", Some("(")), &catalog()),
            Err(RuleError::Pattern { .. })
        ));
        assert!(matches!(
            TagRule::compile(&unknown, &catalog()),
            Err(RuleError::UnknownGravity { .. })
        ));
        assert!(matches!(
            TagRule::compile(&field, &catalog()),
            Err(RuleError::UnknownField { .. })
        ));

        let rules = compile_rules(&[tag("bad", Some("(")), tag("good", Some("x"))], &catalog());
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].name, "good");
    }

    #[test]
    fn rules_past_the_tag_limit_are_dropped() {
        let configs: Vec<TagConfig> = (0..40).map(|i| tag(&format!("t{i}"), None)).collect();
        assert_eq!(compile_rules(&configs, &catalog()).len(), MAX_TAGS);
        assert_eq!(compile_rules(&[], &catalog())[0].name, "default");
    }

    #[test]
    fn default_tag_stays_first_whatever_the_order() {
        let rules = compile_rules(
            &[tag("term", Some("Terminal")), tag("web", None), tag("default", None)],
            &catalog(),
        );
        let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["default", "term", "web"]);

        let rules = compile_rules(&[tag("term", Some("Terminal")), tag("web", None)], &catalog());
        assert_eq!(rules[0].name, "default");
        assert!(rules[0].matcher.is_none());
        let routing = route(&props("Xclock"), &rules, &[]);
        assert_eq!(routing.tags, Tags::DEFAULT);
        assert!(!routing.tags.has(1));
    }

    #[test]
    fn views_select_tags_by_name() {
        let rules = compile_rules(
            &[tag("default", None), tag("www", None), tag("mail", None), tag("term", None)],
            &catalog(),
        );
        let config = ViewConfig {
            name: String::from("net"),
            tags: String::from("www|mail"),
        };
        let view = View::compile(&config, &rules).unwrap();
        assert_eq!(view.tags, Tags::single(1).with(2));

        let views = compile_views(&[], &rules);
        assert_eq!(views[0].tags, Tags::DEFAULT);
    }

    #[test]
    fn tag_mask_operations() {
        let tags = Tags::single(3).with(5);
        assert!(tags.has(3) && tags.has(5));
        assert_eq!(tags.without(3).indices().collect::<Vec<_>>(), vec![5]);
        assert!(Tags::single(MAX_TAGS).is_empty());
    }
}
