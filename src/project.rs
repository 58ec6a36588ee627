#[cfg(test)]
#[path = "project_test.rs"]
mod project_test;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::panel::Panel;
use crate::raster::{PristineSource, RasterHandle};

// ============================================================================
// FIGURE SETTINGS
// ============================================================================

/// Layout requested by the user. `Auto` defers to the smart-layout selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutChoice {
    #[default]
    Auto,
    Stack,
    Grid2x2,
    Grid3x3,
    Grid4xn,
    Custom,
}

impl LayoutChoice {
    /// The concrete layout, or `None` for `Auto`.
    pub fn concrete(self) -> Option<LayoutKind> {
        match self {
            LayoutChoice::Auto => None,
            LayoutChoice::Stack => Some(LayoutKind::Stack),
            LayoutChoice::Grid2x2 => Some(LayoutKind::Grid2x2),
            LayoutChoice::Grid3x3 => Some(LayoutKind::Grid3x3),
            LayoutChoice::Grid4xn => Some(LayoutKind::Grid4xn),
            LayoutChoice::Custom => Some(LayoutKind::Custom),
        }
    }

    pub fn parse(s: &str) -> Option<LayoutChoice> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "smart" => Some(LayoutChoice::Auto),
            "stack" | "vertical" => Some(LayoutChoice::Stack),
            "grid2x2" | "grid2" => Some(LayoutChoice::Grid2x2),
            "grid3x3" | "grid3" => Some(LayoutChoice::Grid3x3),
            "grid4xn" | "grid4" => Some(LayoutChoice::Grid4xn),
            "custom" | "free" => Some(LayoutChoice::Custom),
            _ => None,
        }
    }
}

/// A layout that can actually be rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    Stack,
    Grid2x2,
    Grid3x3,
    Grid4xn,
    Custom,
}

impl LayoutKind {
    /// Column count of the grid family; `None` for free-form.
    pub fn num_cols(self) -> Option<u32> {
        match self {
            LayoutKind::Stack => Some(1),
            LayoutKind::Grid2x2 => Some(2),
            LayoutKind::Grid3x3 => Some(3),
            LayoutKind::Grid4xn => Some(4),
            LayoutKind::Custom => None,
        }
    }

    pub fn from_num_cols(cols: u32) -> LayoutKind {
        match cols {
            0 | 1 => LayoutKind::Stack,
            2 => LayoutKind::Grid2x2,
            3 => LayoutKind::Grid3x3,
            _ => LayoutKind::Grid4xn,
        }
    }

    pub fn is_grid(self) -> bool {
        matches!(self, LayoutKind::Grid2x2 | LayoutKind::Grid3x3 | LayoutKind::Grid4xn)
    }

    pub fn name(self) -> &'static str {
        match self {
            LayoutKind::Stack => "stack",
            LayoutKind::Grid2x2 => "grid2x2",
            LayoutKind::Grid3x3 => "grid3x3",
            LayoutKind::Grid4xn => "grid4xn",
            LayoutKind::Custom => "custom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelPosition {
    #[default]
    Top,
    Left,
}

/// How auto-generated panel labels are spelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelStyle {
    /// A, B, C
    #[default]
    Upper,
    /// a, b, c
    Lower,
    /// (A), (B), (C)
    UpperParen,
    /// (a), (b), (c)
    LowerParen,
    /// 1, 2, 3
    Numeric,
}

impl LabelStyle {
    /// Label for the panel at `order` (0-based). Letters continue AA, AB, … past Z.
    pub fn label_for(self, order: usize) -> String {
        let letters = |upper: bool| {
            let mut n = order;
            let mut out = Vec::new();
            loop {
                let base = if upper { b'A' } else { b'a' };
                out.push((base + (n % 26) as u8) as char);
                if n < 26 {
                    break;
                }
                n = n / 26 - 1;
            }
            out.iter().rev().collect::<String>()
        };
        match self {
            LabelStyle::Upper => letters(true),
            LabelStyle::Lower => letters(false),
            LabelStyle::UpperParen => format!("({})", letters(true)),
            LabelStyle::LowerParen => format!("({})", letters(false)),
            LabelStyle::Numeric => (order + 1).to_string(),
        }
    }
}

/// Which journal column width the figure targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetWidth {
    Single,
    #[default]
    Double,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    #[default]
    Dashed,
    Dotted,
}

/// Appearance of the on-screen grid overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridStyle {
    pub line_style: LineStyle,
    pub color: String,
    pub thickness: f64,
}

impl Default for GridStyle {
    fn default() -> Self {
        Self {
            line_style: LineStyle::Dashed,
            color: "#4a90d9".to_string(),
            thickness: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FigureSettings {
    pub journal: String,
    pub layout: LayoutChoice,
    /// Gap between panels and around the canvas edge, in screen pixels.
    pub spacing: f64,
    pub label_style: LabelStyle,
    pub label_position: LabelPosition,
    pub label_font_family: String,
    /// Label font size in screen pixels.
    pub label_font_size: f64,
    pub label_font_weight: String,
    /// When set, labels are user-edited and never regenerated from order.
    pub custom_labels: bool,
    pub target_width: TargetWidth,
    pub show_grid: bool,
    pub grid_style: GridStyle,
    pub dpi: u32,
    pub background: String,
}

impl Default for FigureSettings {
    fn default() -> Self {
        Self {
            journal: "Default".to_string(),
            layout: LayoutChoice::Auto,
            spacing: 10.0,
            label_style: LabelStyle::Upper,
            label_position: LabelPosition::Top,
            label_font_family: "Arial".to_string(),
            label_font_size: 16.0,
            label_font_weight: "bold".to_string(),
            custom_labels: false,
            target_width: TargetWidth::Double,
            show_grid: false,
            grid_style: GridStyle::default(),
            dpi: 600,
            background: "#ffffff".to_string(),
        }
    }
}

// ============================================================================
// FIGURE
// ============================================================================

/// A named collection of panels plus its layout/label settings.
///
/// `panels` is always kept sorted by `order`, and `order` always equals the
/// panel's index: every mutation here renumbers before returning.
#[derive(Debug, Clone)]
pub struct Figure {
    pub id: Uuid,
    pub name: String,
    pub panels: Vec<Panel>,
    pub settings: FigureSettings,
    pub caption: String,
    /// Concrete layout chosen while `settings.layout` is `Auto`.
    pub effective_layout: Option<LayoutKind>,
}

impl Figure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            panels: Vec::new(),
            settings: FigureSettings::default(),
            caption: String::new(),
            effective_layout: None,
        }
    }

    pub fn panel(&self, id: Uuid) -> Option<&Panel> {
        self.panels.iter().find(|p| p.id == id)
    }

    pub fn panel_mut(&mut self, id: Uuid) -> Option<&mut Panel> {
        self.panels.iter_mut().find(|p| p.id == id)
    }

    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.panels.iter().position(|p| p.id == id)
    }

    /// Append a panel; returns its id.
    pub fn add_panel(&mut self, pristine: PristineSource, baked: RasterHandle) -> Uuid {
        let panel = Panel::new(pristine, baked, self.panels.len());
        let id = panel.id;
        self.panels.push(panel);
        self.renumber();
        id
    }

    /// Insert an existing panel (e.g. moved from another figure) at the end.
    pub fn push_panel(&mut self, mut panel: Panel) {
        panel.order = self.panels.len();
        panel.reset_geometry();
        self.panels.push(panel);
        self.renumber();
    }

    pub fn remove_panel(&mut self, id: Uuid) -> Option<Panel> {
        let idx = self.index_of(id)?;
        let removed = self.panels.remove(idx);
        self.renumber();
        Some(removed)
    }

    /// Move a panel to `new_index` (clamped), shifting the others.
    pub fn move_panel(&mut self, id: Uuid, new_index: usize) -> bool {
        let Some(idx) = self.index_of(id) else { return false };
        let panel = self.panels.remove(idx);
        let target = new_index.min(self.panels.len());
        self.panels.insert(target, panel);
        self.renumber();
        true
    }

    /// Exchange the positions of two panels (drag-and-drop swap).
    pub fn swap_panels(&mut self, a: Uuid, b: Uuid) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(ia), Some(ib)) => {
                self.panels.swap(ia, ib);
                self.renumber();
                true
            }
            _ => false,
        }
    }

    /// Set a user label. Enables custom labelling for the whole figure.
    pub fn set_label(&mut self, id: Uuid, label: impl Into<String>) -> bool {
        let Some(panel) = self.panel_mut(id) else { return false };
        panel.label = label.into();
        self.settings.custom_labels = true;
        true
    }

    /// Change settings. Layout-affecting changes invalidate the cached
    /// effective layout; a layout type change also drops stale geometry.
    pub fn update_settings(&mut self, f: impl FnOnce(&mut FigureSettings)) {
        let before = self.settings.clone();
        f(&mut self.settings);
        if before.layout != self.settings.layout {
            for panel in &mut self.panels {
                panel.reset_geometry();
            }
        }
        let layout_relevant = before.layout != self.settings.layout
            || before.spacing != self.settings.spacing
            || before.journal != self.settings.journal
            || before.target_width != self.settings.target_width
            || before.label_position != self.settings.label_position
            || before.label_font_size != self.settings.label_font_size;
        if layout_relevant {
            self.effective_layout = None;
        }
        if before.label_style != self.settings.label_style
            || before.custom_labels != self.settings.custom_labels
        {
            self.relabel();
        }
    }

    /// The concrete layout to render, if known without running smart selection.
    pub fn resolved_layout(&self) -> Option<LayoutKind> {
        self.settings.layout.concrete().or(self.effective_layout)
    }

    pub fn invalidate_layout(&mut self) {
        self.effective_layout = None;
    }

    /// Re-establish `order == index` and regenerate labels.
    fn renumber(&mut self) {
        for (i, panel) in self.panels.iter_mut().enumerate() {
            panel.order = i;
        }
        self.relabel();
        self.invalidate_layout();
    }

    fn relabel(&mut self) {
        if self.settings.custom_labels {
            return;
        }
        let style = self.settings.label_style;
        for panel in &mut self.panels {
            panel.label = style.label_for(panel.order);
        }
    }

    /// `order` values form exactly `0..N-1`.
    pub fn orders_contiguous(&self) -> bool {
        let mut orders: Vec<usize> = self.panels.iter().map(|p| p.order).collect();
        orders.sort_unstable();
        orders.iter().enumerate().all(|(i, &o)| i == o)
    }
}

// ============================================================================
// PROJECT
// ============================================================================

/// Ordered list of figures plus the active one.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: Uuid,
    pub figures: Vec<Figure>,
    pub active_figure_index: usize,
    /// `None` for unsaved/untitled projects.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,
    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            figures: vec![Figure::new("Figure 1")],
            active_figure_index: 0,
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
        }
    }

    pub fn from_figures(figures: Vec<Figure>, active_figure_index: usize) -> Self {
        let active = active_figure_index.min(figures.len().saturating_sub(1));
        Self {
            id: Uuid::new_v4(),
            figures,
            active_figure_index: active,
            path: None,
            is_dirty: false,
            name: "Untitled".to_string(),
        }
    }

    pub fn active_figure(&self) -> Option<&Figure> {
        self.figures.get(self.active_figure_index)
    }

    pub fn active_figure_mut(&mut self) -> Option<&mut Figure> {
        self.figures.get_mut(self.active_figure_index)
    }

    pub fn add_figure(&mut self, name: impl Into<String>) -> usize {
        self.figures.push(Figure::new(name));
        self.active_figure_index = self.figures.len() - 1;
        self.active_figure_index
    }

    /// Remove a figure. The last remaining figure cannot be removed.
    pub fn remove_figure(&mut self, index: usize) -> Option<Figure> {
        if self.figures.len() <= 1 || index >= self.figures.len() {
            return None;
        }
        let removed = self.figures.remove(index);
        if self.active_figure_index >= self.figures.len() {
            self.active_figure_index = self.figures.len() - 1;
        } else if self.active_figure_index > index {
            self.active_figure_index -= 1;
        }
        Some(removed)
    }

    pub fn set_active_figure(&mut self, index: usize) -> bool {
        if index < self.figures.len() {
            self.active_figure_index = index;
            true
        } else {
            false
        }
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}
