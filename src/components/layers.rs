// ============================================================================
// TEXT LAYERS — ordered text elements, paint order == list order
// ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coords::Point;

/// Edit-space offset applied to a duplicated element.
pub const DUPLICATE_OFFSET: f64 = 20.0;

/// Opaque, unique identifier of a text element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(Uuid);

impl ElementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// STYLE TYPES
// ============================================================================

/// 8-bit RGB color, serialized as `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const WHITE: Rgb = Rgb([255, 255, 255]);

    /// Parse `#rrggbb`, `rrggbb` or the short `#rgb` form.
    pub fn from_hex(s: &str) -> Option<Rgb> {
        let hex = s.trim().trim_start_matches('#');
        let digits: Vec<u8> = hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?;
        match digits.as_slice() {
            [r, g, b] => Some(Rgb([r * 17, g * 17, b * 17])),
            [r1, r0, g1, g0, b1, b0] => Some(Rgb([r1 * 16 + r0, g1 * 16 + g0, b1 * 16 + b0])),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }

    #[inline]
    pub fn with_alpha(self, a: u8) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], a]
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&s).ok_or_else(|| format!("invalid color '{}'", s))
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> String {
        c.to_hex()
    }
}

/// Font families offered by the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontFamily {
    Arial,
    Helvetica,
    #[serde(rename = "Times New Roman")]
    TimesNewRoman,
    Georgia,
    Verdana,
    #[default]
    Impact,
    Montserrat,
    #[serde(rename = "Playfair Display")]
    PlayfairDisplay,
    Lobster,
    Roboto,
    Poppins,
    Oswald,
    Lato,
    Raleway,
}

impl FontFamily {
    pub fn all() -> &'static [FontFamily] {
        &[
            FontFamily::Arial,
            FontFamily::Helvetica,
            FontFamily::TimesNewRoman,
            FontFamily::Georgia,
            FontFamily::Verdana,
            FontFamily::Impact,
            FontFamily::Montserrat,
            FontFamily::PlayfairDisplay,
            FontFamily::Lobster,
            FontFamily::Roboto,
            FontFamily::Poppins,
            FontFamily::Oswald,
            FontFamily::Lato,
            FontFamily::Raleway,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            FontFamily::Arial => "Arial",
            FontFamily::Helvetica => "Helvetica",
            FontFamily::TimesNewRoman => "Times New Roman",
            FontFamily::Georgia => "Georgia",
            FontFamily::Verdana => "Verdana",
            FontFamily::Impact => "Impact",
            FontFamily::Montserrat => "Montserrat",
            FontFamily::PlayfairDisplay => "Playfair Display",
            FontFamily::Lobster => "Lobster",
            FontFamily::Roboto => "Roboto",
            FontFamily::Poppins => "Poppins",
            FontFamily::Oswald => "Oswald",
            FontFamily::Lato => "Lato",
            FontFamily::Raleway => "Raleway",
        }
    }

    pub fn from_name(name: &str) -> Option<FontFamily> {
        FontFamily::all()
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Case transform applied to a rendering copy of the text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTransform {
    #[default]
    None,
    Uppercase,
    Lowercase,
    Capitalize,
}

impl TextTransform {
    /// Returns the text as it should be drawn. The stored text is never touched.
    pub fn apply(&self, text: &str) -> String {
        match self {
            TextTransform::None => text.to_string(),
            TextTransform::Uppercase => text.to_uppercase(),
            TextTransform::Lowercase => text.to_lowercase(),
            TextTransform::Capitalize => {
                let mut out = String::with_capacity(text.len());
                let mut at_word_start = true;
                for ch in text.chars() {
                    if ch.is_whitespace() {
                        at_word_start = true;
                        out.push(ch);
                    } else if at_word_start {
                        at_word_start = false;
                        out.extend(ch.to_uppercase());
                    } else {
                        out.push(ch);
                    }
                }
                out
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Shadow {
    pub enabled: bool,
    pub color: Rgb,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            enabled: true,
            color: Rgb::BLACK,
            blur: 10.0,
            offset_x: 2.0,
            offset_y: 2.0,
        }
    }
}

/// Left-to-right two-stop gradient across the measured text width.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gradient {
    pub enabled: bool,
    pub colors: [Rgb; 2],
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            enabled: false,
            colors: [Rgb([255, 0, 0]), Rgb([0, 0, 255])],
        }
    }
}

// ============================================================================
// TEXT ELEMENT
// ============================================================================

/// One text layer. Position is in edit space (the on-screen container).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextElement {
    pub id: ElementId,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: f32,
    pub font_family: FontFamily,
    pub color: Rgb,
    pub stroke: Rgb,
    pub stroke_width: f32,
    pub opacity: f32,
    /// Degrees, clockwise-positive. Not range-limited here.
    pub rotation: f32,
    pub visible: bool,
    pub shadow: Shadow,
    pub letter_spacing: f32,
    /// Kept for the editor; single-line rendering does not use it.
    pub line_height: f32,
    pub text_transform: TextTransform,
    pub gradient: Gradient,
}

impl Default for TextElement {
    fn default() -> Self {
        Self {
            id: ElementId::new(),
            text: "Behind Text".to_string(),
            x: 50.0,
            y: 50.0,
            font_size: 48.0,
            font_family: FontFamily::Impact,
            color: Rgb::BLACK,
            stroke: Rgb::WHITE,
            stroke_width: 2.0,
            opacity: 1.0,
            rotation: 0.0,
            visible: true,
            shadow: Shadow::default(),
            letter_spacing: 0.0,
            line_height: 1.2,
            text_transform: TextTransform::None,
            gradient: Gradient::default(),
        }
    }
}

impl TextElement {
    #[inline]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Text as drawn, after the case transform.
    pub fn display_text(&self) -> String {
        self.text_transform.apply(&self.text)
    }
}

/// Partial update of a [`TextElement`]; `None` fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextElementPatch {
    pub text: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub font_size: Option<f32>,
    pub font_family: Option<FontFamily>,
    pub color: Option<Rgb>,
    pub stroke: Option<Rgb>,
    pub stroke_width: Option<f32>,
    pub opacity: Option<f32>,
    pub rotation: Option<f32>,
    pub visible: Option<bool>,
    pub shadow: Option<Shadow>,
    pub letter_spacing: Option<f32>,
    pub line_height: Option<f32>,
    pub text_transform: Option<TextTransform>,
    pub gradient: Option<Gradient>,
}

impl TextElementPatch {
    pub fn position(p: Point) -> Self {
        Self {
            x: Some(p.x),
            y: Some(p.y),
            ..Default::default()
        }
    }

    /// Apply to `el`, normalizing out-of-range values. Returns whether anything changed.
    pub fn apply_to(&self, el: &mut TextElement) -> bool {
        let before = el.clone();
        if let Some(ref t) = self.text {
            el.text = t.clone();
        }
        if let Some(x) = self.x.filter(|v| v.is_finite()) {
            el.x = x;
        }
        if let Some(y) = self.y.filter(|v| v.is_finite()) {
            el.y = y;
        }
        if let Some(size) = self.font_size.filter(|s| s.is_finite() && *s > 0.0) {
            el.font_size = size;
        }
        if let Some(family) = self.font_family {
            el.font_family = family;
        }
        if let Some(c) = self.color {
            el.color = c;
        }
        if let Some(c) = self.stroke {
            el.stroke = c;
        }
        if let Some(w) = self.stroke_width.filter(|w| w.is_finite()) {
            el.stroke_width = w.max(0.0);
        }
        if let Some(o) = self.opacity.filter(|o| o.is_finite()) {
            el.opacity = o.clamp(0.0, 1.0);
        }
        if let Some(r) = self.rotation.filter(|r| r.is_finite()) {
            el.rotation = r;
        }
        if let Some(v) = self.visible {
            el.visible = v;
        }
        if let Some(mut s) = self.shadow {
            s.blur = if s.blur.is_finite() { s.blur.max(0.0) } else { 0.0 };
            el.shadow = s;
        }
        if let Some(ls) = self.letter_spacing.filter(|v| v.is_finite()) {
            el.letter_spacing = ls;
        }
        if let Some(lh) = self.line_height.filter(|v| v.is_finite()) {
            el.line_height = lh;
        }
        if let Some(t) = self.text_transform {
            el.text_transform = t;
        }
        if let Some(g) = self.gradient {
            el.gradient = g;
        }
        *el != before
    }
}

// ============================================================================
// LAYER MODEL
// ============================================================================

/// Mutation of the layer model. Everything that changes [`TextLayers`]
/// goes through one of these.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerCommand {
    /// Append a default element and select it.
    Add,
    /// Append the given element (fresh id assigned if it collides) and select it.
    Insert(TextElement),
    Update(ElementId, TextElementPatch),
    /// Append a copy offset by [`DUPLICATE_OFFSET`] and select it.
    Duplicate(ElementId),
    Remove(ElementId),
    SetVisible(ElementId, bool),
    Select(Option<ElementId>),
    /// Remove every element and clear the selection.
    Clear,
}

/// Ordered text elements plus the current selection.
///
/// Single writer: callers hold `&mut` and apply [`LayerCommand`]s. `version`
/// increases on every change that has an effect, so observers can detect
/// staleness without diffing.
#[derive(Clone, Debug, Default)]
pub struct TextLayers {
    elements: Vec<TextElement>,
    selected: Option<ElementId>,
    version: u64,
}

impl TextLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<TextElement>) -> Self {
        let mut layers = Self::new();
        for el in elements {
            layers.apply(LayerCommand::Insert(el));
        }
        layers.selected = None;
        layers
    }

    pub fn elements(&self) -> &[TextElement] {
        &self.elements
    }

    /// Stable copy for export; later mutations do not affect it.
    pub fn snapshot(&self) -> Vec<TextElement> {
        self.elements.clone()
    }

    pub fn get(&self, id: ElementId) -> Option<&TextElement> {
        self.elements.iter().find(|el| el.id == id)
    }

    pub fn selected(&self) -> Option<ElementId> {
        self.selected
    }

    pub fn selected_element(&self) -> Option<&TextElement> {
        self.selected.and_then(|id| self.get(id))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Apply a command. Returns the id of a newly created element, if any.
    /// Commands naming an unknown id are no-ops.
    pub fn apply(&mut self, cmd: LayerCommand) -> Option<ElementId> {
        match cmd {
            LayerCommand::Add => Some(self.push(TextElement::default())),
            LayerCommand::Insert(el) => Some(self.push(el)),
            LayerCommand::Update(id, patch) => {
                if let Some(el) = self.elements.iter_mut().find(|el| el.id == id)
                    && patch.apply_to(el)
                {
                    self.version += 1;
                }
                None
            }
            LayerCommand::Duplicate(id) => {
                let mut copy = self.get(id)?.clone();
                copy.id = ElementId::new();
                copy.x += DUPLICATE_OFFSET;
                copy.y += DUPLICATE_OFFSET;
                Some(self.push(copy))
            }
            LayerCommand::Remove(id) => {
                let before = self.elements.len();
                self.elements.retain(|el| el.id != id);
                if self.elements.len() != before {
                    self.selected = None;
                    self.version += 1;
                }
                None
            }
            LayerCommand::SetVisible(id, visible) => self.apply(LayerCommand::Update(
                id,
                TextElementPatch {
                    visible: Some(visible),
                    ..Default::default()
                },
            )),
            LayerCommand::Select(sel) => {
                if let Some(id) = sel
                    && self.get(id).is_none()
                {
                    return None;
                }
                if sel != self.selected {
                    self.selected = sel;
                    self.version += 1;
                }
                None
            }
            LayerCommand::Clear => {
                if !self.elements.is_empty() || self.selected.is_some() {
                    self.elements.clear();
                    self.selected = None;
                    self.version += 1;
                }
                None
            }
        }
    }

    fn push(&mut self, mut el: TextElement) -> ElementId {
        if self.get(el.id).is_some() {
            el.id = ElementId::new();
        }
        let id = el.id;
        self.elements.push(el);
        self.selected = Some(id);
        self.version += 1;
        id
    }

    // -- Convenience wrappers matching the editor's operations --------------

    pub fn add_element(&mut self) -> ElementId {
        self.push(TextElement::default())
    }

    pub fn update_element(&mut self, id: ElementId, patch: TextElementPatch) {
        self.apply(LayerCommand::Update(id, patch));
    }

    pub fn duplicate_element(&mut self, id: ElementId) -> Option<ElementId> {
        self.apply(LayerCommand::Duplicate(id))
    }

    pub fn remove_element(&mut self, id: ElementId) {
        self.apply(LayerCommand::Remove(id));
    }

    pub fn set_visible(&mut self, id: ElementId, visible: bool) {
        self.apply(LayerCommand::SetVisible(id, visible));
    }

    pub fn select(&mut self, id: Option<ElementId>) {
        self.apply(LayerCommand::Select(id));
    }

    pub fn move_element(&mut self, id: ElementId, pos: Point) {
        self.apply(LayerCommand::Update(id, TextElementPatch::position(pos)));
    }
}
