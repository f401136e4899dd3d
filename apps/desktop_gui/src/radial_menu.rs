//! Radial action menu: open/closed state, the angular layout of the action
//! items, and the time-based interpolation that drives item position, scale,
//! opacity, and the central control's rotation.
//!
//! Pure local UI state. No I/O happens here; timestamps are passed in so the
//! animation math stays deterministic under test.

use std::time::{Duration, Instant};

use shared::domain::EntityKind;

pub const MENU_ANIM_DURATION: Duration = Duration::from_millis(200);
/// Delay between the menu starting to close and the creation form opening,
/// so the two transitions never visually overlap.
pub const MODAL_OPEN_DELAY: Duration = Duration::from_millis(250);
pub const MENU_RADIUS: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    GoHome,
    OpenProfile,
    AddEntity,
}

#[derive(Debug, Clone, Copy)]
pub struct MenuItem {
    pub action: MenuAction,
    pub angle_degrees: f32,
}

/// Fixed item set, fanned out counter-clockwise from due left to straight up.
pub const MENU_ITEMS: [MenuItem; 3] = [
    MenuItem {
        action: MenuAction::GoHome,
        angle_degrees: 180.0,
    },
    MenuItem {
        action: MenuAction::OpenProfile,
        angle_degrees: 225.0,
    },
    MenuItem {
        action: MenuAction::AddEntity,
        angle_degrees: 270.0,
    },
];

/// Icon for the add action. A pure function of the section the user is
/// looking at, recomputed every frame rather than cached.
pub fn add_icon(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Site => "🌐",
        EntityKind::Store => "🛒",
    }
}

pub fn action_icon(action: MenuAction, section: EntityKind) -> &'static str {
    match action {
        MenuAction::GoHome => "🏠",
        MenuAction::OpenProfile => "👤",
        MenuAction::AddEntity => add_icon(section),
    }
}

struct Interpolation {
    from: f32,
    target: f32,
    started_at: Instant,
}

impl Interpolation {
    fn value_at(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started_at);
        let t = (elapsed.as_secs_f32() / MENU_ANIM_DURATION.as_secs_f32()).clamp(0.0, 1.0);
        self.from + (self.target - self.from) * t
    }

    fn finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= MENU_ANIM_DURATION
    }
}

/// Owns the menu's open/closed state and the expansion progress in [0, 1].
/// State flips instantly on toggle; the visuals catch up over
/// [`MENU_ANIM_DURATION`]. A toggle that lands mid-animation starts the new
/// interpolation from the current animated value, so the transition reverses
/// smoothly instead of jumping.
pub struct RadialMenuController {
    state: MenuState,
    anim: Option<Interpolation>,
}

impl RadialMenuController {
    pub fn new() -> Self {
        Self {
            state: MenuState::Closed,
            anim: None,
        }
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == MenuState::Open
    }

    pub fn toggle(&mut self, now: Instant) {
        let from = self.progress(now);
        self.state = match self.state {
            MenuState::Closed => MenuState::Open,
            MenuState::Open => MenuState::Closed,
        };
        let target = if self.is_open() { 1.0 } else { 0.0 };
        self.anim = Some(Interpolation {
            from,
            target,
            started_at: now,
        });
    }

    /// Expansion progress: 0 fully collapsed, 1 fully expanded.
    pub fn progress(&self, now: Instant) -> f32 {
        match &self.anim {
            Some(anim) => anim.value_at(now),
            None => {
                if self.is_open() {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        self.anim.as_ref().is_some_and(|anim| !anim.finished(now))
    }

    /// Drops a finished interpolation. Call once per frame.
    pub fn settle(&mut self, now: Instant) {
        if self.anim.as_ref().is_some_and(|anim| anim.finished(now)) {
            self.anim = None;
        }
    }

    /// Invokes an item. Items are not interactive while the menu is closed;
    /// a successful activation closes the menu first and hands the action
    /// back to the caller.
    pub fn activate(&mut self, action: MenuAction, now: Instant) -> Option<MenuAction> {
        if self.state != MenuState::Open {
            return None;
        }
        self.toggle(now);
        Some(action)
    }

    /// Offset of an item from the central control at the current progress.
    pub fn item_offset(&self, item: &MenuItem, now: Instant) -> (f32, f32) {
        let p = self.progress(now);
        let radians = item.angle_degrees.to_radians();
        (
            MENU_RADIUS * radians.cos() * p,
            MENU_RADIUS * radians.sin() * p,
        )
    }

    pub fn item_scale(&self, now: Instant) -> f32 {
        self.progress(now)
    }

    /// Items stay invisible through the first half of the expansion, then
    /// fade in over the second half.
    pub fn item_opacity(&self, now: Instant) -> f32 {
        let p = self.progress(now);
        ((p - 0.5).max(0.0)) * 2.0
    }

    /// The central control rotates from + toward x as the menu opens.
    pub fn control_rotation_degrees(&self, now: Instant) -> f32 {
        45.0 * self.progress(now)
    }
}

impl Default for RadialMenuController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn odd_toggles_open_even_toggles_close() {
        let base = Instant::now();
        let mut menu = RadialMenuController::new();
        assert_eq!(menu.state(), MenuState::Closed);

        for round in 1..=6 {
            menu.toggle(at(base, round * 1000));
            let expected = if round % 2 == 1 {
                MenuState::Open
            } else {
                MenuState::Closed
            };
            assert_eq!(menu.state(), expected, "after {round} toggles");
        }
    }

    #[test]
    fn activation_is_inert_while_closed() {
        let base = Instant::now();
        let mut menu = RadialMenuController::new();

        assert_eq!(menu.activate(MenuAction::AddEntity, base), None);
        assert_eq!(menu.state(), MenuState::Closed);
        assert_eq!(menu.progress(base), 0.0);
    }

    #[test]
    fn activation_closes_the_menu_and_returns_the_action() {
        let base = Instant::now();
        let mut menu = RadialMenuController::new();
        menu.toggle(base);

        let action = menu.activate(MenuAction::AddEntity, at(base, 1000));
        assert_eq!(action, Some(MenuAction::AddEntity));
        assert_eq!(menu.state(), MenuState::Closed);
    }

    #[test]
    fn expansion_runs_to_completion_over_the_fixed_duration() {
        let base = Instant::now();
        let mut menu = RadialMenuController::new();
        menu.toggle(base);

        assert_eq!(menu.progress(base), 0.0);
        assert!((menu.progress(at(base, 100)) - 0.5).abs() < 1e-4);
        assert_eq!(menu.progress(at(base, 200)), 1.0);
        assert_eq!(menu.progress(at(base, 5000)), 1.0);

        assert!(menu.is_animating(at(base, 100)));
        assert!(!menu.is_animating(at(base, 200)));
        menu.settle(at(base, 200));
        assert_eq!(menu.progress(at(base, 200)), 1.0);
    }

    #[test]
    fn retoggle_mid_animation_reverses_from_the_current_value() {
        let base = Instant::now();
        let mut menu = RadialMenuController::new();
        menu.toggle(base);

        // Halfway open, toggle again: progress walks back down from 0.5
        // instead of restarting at 1.0 or snapping.
        menu.toggle(at(base, 100));
        assert_eq!(menu.state(), MenuState::Closed);
        assert!((menu.progress(at(base, 100)) - 0.5).abs() < 1e-4);
        assert!((menu.progress(at(base, 200)) - 0.25).abs() < 1e-4);
        assert_eq!(menu.progress(at(base, 300)), 0.0);

        menu.settle(at(base, 300));
        assert!(!menu.is_animating(at(base, 300)));
        assert_eq!(menu.state(), MenuState::Closed);
    }

    #[test]
    fn items_fade_in_only_during_the_second_half() {
        let base = Instant::now();
        let mut menu = RadialMenuController::new();
        menu.toggle(base);

        assert_eq!(menu.item_opacity(at(base, 50)), 0.0);
        assert!((menu.item_opacity(at(base, 150)) - 0.5).abs() < 1e-4);
        assert_eq!(menu.item_opacity(at(base, 200)), 1.0);
    }

    #[test]
    fn fully_open_items_sit_on_the_circle() {
        let base = Instant::now();
        let mut menu = RadialMenuController::new();
        menu.toggle(base);
        let now = at(base, 200);

        let (x, y) = menu.item_offset(&MENU_ITEMS[2], now);
        assert!(x.abs() < 1e-3, "straight-up item has no x offset, got {x}");
        assert!((y + MENU_RADIUS).abs() < 1e-3, "straight-up item is above, got {y}");

        let (x, y) = menu.item_offset(&MENU_ITEMS[0], now);
        assert!((x + MENU_RADIUS).abs() < 1e-3, "due-left item, got {x}");
        assert!(y.abs() < 1e-3);

        assert_eq!(menu.control_rotation_degrees(now), 45.0);
    }

    #[test]
    fn add_icon_follows_the_current_section() {
        assert_eq!(action_icon(MenuAction::AddEntity, EntityKind::Site), "🌐");
        assert_eq!(action_icon(MenuAction::AddEntity, EntityKind::Store), "🛒");
        assert_eq!(action_icon(MenuAction::GoHome, EntityKind::Store), "🏠");
    }
}
