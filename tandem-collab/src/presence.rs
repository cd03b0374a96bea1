//! Remote cursor and selection presence.
//!
//! Tracks who else is in the document, where their carets are, and when
//! they were last heard from. Entries older than the TTL are evicted by
//! a periodic sweep, so a silently vanished peer fades out instead of
//! leaving a ghost caret behind.
//!
//! Pixel projection resolves a character offset to a structural location
//! and asks the rendering layer for its caret box. An empty line reports
//! degenerate geometry, so projection falls back to measuring a
//! zero-width probe at the same location.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::UserProfile;
use crate::sequencer::CursorUpdate;
use tandem_engine::{locate, DocTree, Location};

/// 2D point in surface coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned box in surface coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// A zero-size box: the empty-line caret symptom.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }
}

/// Projects tree locations to screen geometry. Implemented by whatever
/// renders the document; the tracker only consumes it.
pub trait RenderSurface {
    /// Bounding box of the caret at a location.
    fn caret_rect(&self, loc: &Location) -> Rect;
    /// Measure a zero-width probe at the location, used when the caret
    /// box comes back degenerate.
    fn probe_rect(&self, loc: &Location) -> Rect;
}

/// RGBA cursor color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl CursorColor {
    /// Generate a stable, visually distinct color from a user id.
    ///
    /// High-saturation HSL keyed on the id hash, so the same user gets
    /// the same color on every client.
    pub fn from_uuid(id: Uuid) -> Self {
        let hash = id.as_u128();
        let hue = ((hash % 360) as f32) / 360.0;
        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
        Self { r, g, b, a: 1.0 }
    }

    /// Parse a `#rrggbb` hex color.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        })
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// One remote user's tracked caret.
#[derive(Debug, Clone)]
pub struct RemoteCursor {
    pub user_id: Uuid,
    pub display_name: String,
    pub color: CursorColor,
    pub offset: usize,
    pub selection: Option<(usize, usize)>,
    last_update: Instant,
    last_timestamp: u64,
}

impl RemoteCursor {
    /// Time since the last update for this cursor.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_update)
    }
}

/// Everything a renderer needs to draw one remote caret.
#[derive(Debug, Clone)]
pub struct CursorRenderData {
    pub user_id: Uuid,
    pub point: Point,
    pub color: CursorColor,
    pub display_name: String,
    pub selection: Option<(usize, usize)>,
}

/// Owns the set of remote cursors for one document session.
pub struct PresenceTracker {
    local_user: Uuid,
    ttl: Duration,
    roster: HashMap<Uuid, UserProfile>,
    cursors: HashMap<Uuid, RemoteCursor>,
}

impl PresenceTracker {
    pub fn new(local_user: Uuid, ttl: Duration) -> Self {
        Self {
            local_user,
            ttl,
            roster: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    /// Replace the roster from a `current-users` snapshot. Cursors of
    /// users no longer present are dropped.
    pub fn set_roster(&mut self, users: Vec<UserProfile>) {
        self.roster = users
            .into_iter()
            .filter(|u| u.user_id != self.local_user)
            .map(|u| (u.user_id, u))
            .collect();
        let roster = &self.roster;
        self.cursors.retain(|id, _| roster.contains_key(id));
    }

    pub fn handle_join(&mut self, profile: UserProfile) {
        if profile.user_id == self.local_user {
            return;
        }
        log::debug!("{} joined", profile.display_name());
        self.roster.insert(profile.user_id, profile);
    }

    pub fn handle_leave(&mut self, user_id: Uuid) {
        if let Some(profile) = self.roster.remove(&user_id) {
            log::debug!("{} left", profile.display_name());
        }
        self.cursors.remove(&user_id);
    }

    /// Place or move a remote cursor. Stale updates (older origin
    /// timestamp than the one already applied) are rejected.
    pub fn apply_cursor(&mut self, update: &CursorUpdate, now: Instant) {
        if update.user_id == self.local_user {
            return;
        }
        if let Some(existing) = self.cursors.get_mut(&update.user_id) {
            if update.timestamp < existing.last_timestamp {
                return;
            }
            existing.offset = update.offset;
            existing.selection = update.selection;
            existing.last_update = now;
            existing.last_timestamp = update.timestamp;
            return;
        }

        // A cursor can precede its user-join when frames race; build a
        // placeholder identity until the roster catches up.
        let (display_name, color) = match self.roster.get(&update.user_id) {
            Some(profile) => (
                profile.display_name(),
                profile
                    .color
                    .as_deref()
                    .and_then(CursorColor::from_hex)
                    .unwrap_or_else(|| CursorColor::from_uuid(update.user_id)),
            ),
            None => (
                format!("User-{}", &update.user_id.to_string()[..8]),
                CursorColor::from_uuid(update.user_id),
            ),
        };
        self.cursors.insert(
            update.user_id,
            RemoteCursor {
                user_id: update.user_id,
                display_name,
                color,
                offset: update.offset,
                selection: update.selection,
                last_update: now,
                last_timestamp: update.timestamp,
            },
        );
    }

    /// Evict cursors not refreshed within the TTL. Returns the evicted
    /// user ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<Uuid> {
        let ttl = self.ttl;
        let stale: Vec<Uuid> = self
            .cursors
            .iter()
            .filter(|(_, c)| c.age(now) > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            log::debug!("evicting stale cursor for {id}");
            self.cursors.remove(id);
        }
        stale
    }

    /// Project one offset to a screen point, with the zero-width probe
    /// fallback for degenerate caret boxes.
    pub fn project(
        tree: &mut DocTree,
        offset: usize,
        surface: &dyn RenderSurface,
    ) -> Point {
        let loc = locate(tree, offset);
        let mut rect = surface.caret_rect(&loc);
        if rect.is_degenerate() {
            rect = surface.probe_rect(&loc);
        }
        Point { x: rect.x, y: rect.y }
    }

    /// Snapshot all cursors as render data, projected through `surface`.
    pub fn render_cursors(
        &self,
        tree: &mut DocTree,
        surface: &dyn RenderSurface,
    ) -> Vec<CursorRenderData> {
        self.cursors
            .values()
            .map(|cursor| CursorRenderData {
                user_id: cursor.user_id,
                point: Self::project(tree, cursor.offset, surface),
                color: cursor.color,
                display_name: cursor.display_name.clone(),
                selection: cursor.selection,
            })
            .collect()
    }

    pub fn cursor(&self, user_id: &Uuid) -> Option<&RemoteCursor> {
        self.cursors.get(user_id)
    }

    pub fn cursors(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.cursors.values()
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn roster(&self) -> impl Iterator<Item = &UserProfile> {
        self.roster.values()
    }

    pub fn local_user(&self) -> Uuid {
        self.local_user
    }
}
