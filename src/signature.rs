//! Freehand and uploaded signatures.
//!
//! A [`SignaturePad`] owns a fixed 300x100 RGBA surface and moves between two
//! states. A press starts a path, moves draw straight segments from the last
//! point, and a release (or the pointer leaving) encodes the surface as a PNG
//! data URL and hands it to a [`SignatureSink`]. Uploads bypass the state
//! machine: the file is drawn aspect-fit onto the surface but the sink receives
//! the original file bytes.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::KeyValueStore;
use crate::error::SignatureError;
use crate::media::{self, DataUrl};
use crate::store::{CompanyField, DocumentStore, FieldPath};

pub const SURFACE_WIDTH: u32 = 300;
pub const SURFACE_HEIGHT: u32 = 100;

// Half of the 2px line width
const STROKE_RADIUS: f32 = 1.0;
const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerAction {
    Press,
    Move,
    Release,
    Leave,
}

/// A raw pointer event plus where the surface sat on screen when it fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerEvent {
    pub action: PointerAction,
    pub client_x: f32,
    pub client_y: f32,
    #[serde(default)]
    pub surface_left: f32,
    #[serde(default)]
    pub surface_top: f32,
}

impl PointerEvent {
    pub fn new(action: PointerAction, client_x: f32, client_y: f32) -> Self {
        Self {
            action,
            client_x,
            client_y,
            surface_left: 0.0,
            surface_top: 0.0,
        }
    }

    pub fn with_offset(mut self, left: f32, top: f32) -> Self {
        self.surface_left = left;
        self.surface_top = top;
        self
    }

    /// Surface-local coordinates for this event.
    pub fn local(&self) -> Point {
        Point {
            x: self.client_x - self.surface_left,
            y: self.client_y - self.surface_top,
        }
    }
}

/// Where finished signatures go.
pub trait SignatureSink {
    fn store_signature(&mut self, url: String);
}

impl<C: KeyValueStore> SignatureSink for DocumentStore<C> {
    fn store_signature(&mut self, url: String) {
        self.update_field(FieldPath::Company(CompanyField::SignatureUrl), url);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadState {
    Idle,
    Drawing { last: Point },
}

pub struct SignaturePad {
    surface: RgbaImage,
    state: PadState,
    // The signature URL the surface currently reflects
    shown: Option<String>,
}

impl Default for SignaturePad {
    fn default() -> Self {
        Self::new()
    }
}

impl SignaturePad {
    pub fn new() -> Self {
        Self {
            surface: blank_surface(),
            state: PadState::Idle,
            shown: None,
        }
    }

    pub fn state(&self) -> PadState {
        self.state
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Feeds one pointer event through the state machine.
    pub fn handle<S: SignatureSink>(
        &mut self,
        event: &PointerEvent,
        sink: &mut S,
    ) -> Result<(), SignatureError> {
        let point = event.local();
        match (self.state, event.action) {
            (_, PointerAction::Press) => {
                self.state = PadState::Drawing { last: point };
            }
            (PadState::Drawing { last }, PointerAction::Move) => {
                draw_segment(&mut self.surface, last, point);
                self.state = PadState::Drawing { last: point };
            }
            (PadState::Drawing { .. }, PointerAction::Release | PointerAction::Leave) => {
                self.state = PadState::Idle;
                let url = self.encode_surface()?;
                debug!(bytes = url.len(), "stroke finished");
                self.shown = Some(url.clone());
                sink.store_signature(url);
            }
            (PadState::Idle, _) => {}
        }
        Ok(())
    }

    /// Replays a recorded event sequence, returning how many strokes were stored.
    pub fn replay<S: SignatureSink>(
        &mut self,
        events: &[PointerEvent],
        sink: &mut S,
    ) -> Result<usize, SignatureError> {
        let mut strokes = 0;
        for event in events {
            let was_drawing = matches!(self.state, PadState::Drawing { .. });
            self.handle(event, sink)?;
            if was_drawing && self.state == PadState::Idle {
                strokes += 1;
            }
        }
        Ok(strokes)
    }

    /// Draws an image file onto the surface and stores the file itself.
    pub fn upload<S: SignatureSink>(
        &mut self,
        bytes: &[u8],
        sink: &mut S,
    ) -> Result<(), SignatureError> {
        let url = media::image_data_url(bytes)?;
        let image = image::load_from_memory(bytes)?;
        self.render_fitted(&image);
        self.state = PadState::Idle;
        self.shown = Some(url.clone());
        sink.store_signature(url);
        Ok(())
    }

    pub fn clear<S: SignatureSink>(&mut self, sink: &mut S) {
        self.surface = blank_surface();
        self.state = PadState::Idle;
        self.shown = Some(String::new());
        sink.store_signature(String::new());
    }

    /// Brings the surface in line with a stored signature that the pad did not
    /// draw itself, e.g. one restored from the cache.
    ///
    /// A value that cannot be decoded leaves a blank, usable surface behind
    /// the returned error.
    pub fn sync(&mut self, signature_url: Option<&str>) -> Result<(), SignatureError> {
        let url = signature_url.unwrap_or_default();
        if self.shown.as_deref() == Some(url) {
            return Ok(());
        }
        self.shown = Some(url.to_string());
        if url.is_empty() {
            self.surface = blank_surface();
            return Ok(());
        }
        let loaded = DataUrl::parse(url)
            .and_then(|decoded| Ok(image::load_from_memory(&decoded.bytes)?));
        match loaded {
            Ok(image) => {
                self.render_fitted(&image);
                Ok(())
            }
            Err(e) => {
                self.surface = blank_surface();
                self.state = PadState::Idle;
                Err(e)
            }
        }
    }

    fn render_fitted(&mut self, image: &DynamicImage) {
        self.surface = blank_surface();
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        let fitted = image
            .resize(SURFACE_WIDTH, SURFACE_HEIGHT, FilterType::Triangle)
            .to_rgba8();
        let x = (SURFACE_WIDTH.saturating_sub(fitted.width()) / 2) as i64;
        let y = (SURFACE_HEIGHT.saturating_sub(fitted.height()) / 2) as i64;
        imageops::overlay(&mut self.surface, &fitted, x, y);
    }

    fn encode_surface(&self) -> Result<String, SignatureError> {
        let mut bytes = Vec::new();
        self.surface
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(media::encode("image/png", &bytes))
    }
}

fn blank_surface() -> RgbaImage {
    RgbaImage::new(SURFACE_WIDTH, SURFACE_HEIGHT)
}

/// Inks every pixel whose center lies within the stroke radius of the segment,
/// which also gives the round caps.
fn draw_segment(surface: &mut RgbaImage, from: Point, to: Point) {
    let (width, height) = (surface.width() as f32, surface.height() as f32);
    let min_x = (from.x.min(to.x) - STROKE_RADIUS).floor().max(0.0);
    let max_x = (from.x.max(to.x) + STROKE_RADIUS).ceil().min(width - 1.0);
    let min_y = (from.y.min(to.y) - STROKE_RADIUS).floor().max(0.0);
    let max_y = (from.y.max(to.y) + STROKE_RADIUS).ceil().min(height - 1.0);
    if min_x > max_x || min_y > max_y {
        return;
    }

    for py in min_y as u32..=max_y as u32 {
        for px in min_x as u32..=max_x as u32 {
            let center = Point {
                x: px as f32 + 0.5,
                y: py as f32 + 0.5,
            };
            if distance_to_segment(center, from, to) <= STROKE_RADIUS {
                surface.put_pixel(px, py, INK);
            }
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl SignatureSink for Recorder {
        fn store_signature(&mut self, url: String) {
            self.0.push(url);
        }
    }

    fn png_of(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn decode(url: &str) -> RgbaImage {
        let data = DataUrl::parse(url).unwrap();
        image::load_from_memory(&data.bytes).unwrap().to_rgba8()
    }

    #[test]
    fn press_move_release_stores_one_png() {
        let mut pad = SignaturePad::new();
        let mut sink = Recorder::default();
        let events = [
            PointerEvent::new(PointerAction::Press, 110.0, 220.0).with_offset(100.0, 200.0),
            PointerEvent::new(PointerAction::Move, 160.0, 220.0).with_offset(100.0, 200.0),
            PointerEvent::new(PointerAction::Release, 160.0, 220.0).with_offset(100.0, 200.0),
        ];

        let strokes = pad.replay(&events, &mut sink).unwrap();

        assert_eq!(strokes, 1);
        assert_eq!(sink.0.len(), 1);
        assert!(sink.0[0].starts_with("data:image/png;base64,"));
        let stored = decode(&sink.0[0]);
        assert_eq!(stored.dimensions(), (SURFACE_WIDTH, SURFACE_HEIGHT));
        assert_eq!(stored.get_pixel(30, 20), &INK);
        assert_eq!(stored.get_pixel(30, 50)[3], 0);
        assert_eq!(pad.state(), PadState::Idle);
    }

    #[test]
    fn events_while_idle_are_ignored() {
        let mut pad = SignaturePad::new();
        let mut sink = Recorder::default();
        pad.handle(&PointerEvent::new(PointerAction::Move, 10.0, 10.0), &mut sink)
            .unwrap();
        pad.handle(&PointerEvent::new(PointerAction::Release, 10.0, 10.0), &mut sink)
            .unwrap();
        pad.handle(&PointerEvent::new(PointerAction::Leave, 10.0, 10.0), &mut sink)
            .unwrap();
        assert!(sink.0.is_empty());
        assert!(pad.surface().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn leaving_the_surface_finishes_the_stroke() {
        let mut pad = SignaturePad::new();
        let mut sink = Recorder::default();
        pad.handle(&PointerEvent::new(PointerAction::Press, 5.0, 5.0), &mut sink)
            .unwrap();
        assert_eq!(pad.state(), PadState::Drawing { last: Point { x: 5.0, y: 5.0 } });
        pad.handle(&PointerEvent::new(PointerAction::Move, 25.0, 5.0), &mut sink)
            .unwrap();
        pad.handle(&PointerEvent::new(PointerAction::Leave, 400.0, 5.0), &mut sink)
            .unwrap();
        assert_eq!(sink.0.len(), 1);
    }

    #[test]
    fn offset_is_read_from_each_event() {
        let mut pad = SignaturePad::new();
        let mut sink = Recorder::default();
        let events = [
            PointerEvent::new(PointerAction::Press, 10.0, 10.0),
            PointerEvent::new(PointerAction::Move, 30.0, 10.0),
            PointerEvent::new(PointerAction::Release, 30.0, 10.0),
            // the surface has moved down the page by 500px
            PointerEvent::new(PointerAction::Press, 10.0, 580.0).with_offset(0.0, 500.0),
            PointerEvent::new(PointerAction::Move, 30.0, 580.0).with_offset(0.0, 500.0),
            PointerEvent::new(PointerAction::Release, 30.0, 580.0).with_offset(0.0, 500.0),
        ];
        assert_eq!(pad.replay(&events, &mut sink).unwrap(), 2);
        assert_eq!(pad.surface().get_pixel(20, 80), &INK);
        assert_eq!(pad.surface().get_pixel(20, 10), &INK);
    }

    #[test]
    fn upload_stores_original_bytes_and_draws_fitted() {
        let mut pad = SignaturePad::new();
        let mut sink = Recorder::default();
        let file = png_of(600, 100, [200, 0, 0, 255]);

        pad.upload(&file, &mut sink).unwrap();

        assert_eq!(sink.0.len(), 1);
        assert_eq!(DataUrl::parse(&sink.0[0]).unwrap().bytes, file);
        // 600x100 fits as 300x50, centered vertically
        assert_eq!(pad.surface().get_pixel(150, 10)[3], 0);
        assert_eq!(pad.surface().get_pixel(150, 50), &Rgba([200, 0, 0, 255]));
        assert_eq!(pad.surface().get_pixel(150, 90)[3], 0);
    }

    #[test]
    fn upload_of_garbage_changes_nothing() {
        let mut pad = SignaturePad::new();
        let mut sink = Recorder::default();
        assert!(pad.upload(b"definitely not an image", &mut sink).is_err());
        assert!(sink.0.is_empty());
    }

    #[test]
    fn clear_empties_surface_and_signature() {
        let mut pad = SignaturePad::new();
        let mut sink = Recorder::default();
        pad.upload(&png_of(10, 10, [0, 0, 0, 255]), &mut sink).unwrap();
        pad.clear(&mut sink);
        assert_eq!(sink.0.last().map(String::as_str), Some(""));
        assert_eq!(pad.state(), PadState::Idle);
        assert!(pad.surface().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn sync_redraws_external_signatures_only() {
        let mut pad = SignaturePad::new();
        let url = media::encode("image/png", &png_of(100, 100, [0, 0, 255, 255]));

        pad.sync(Some(&url)).unwrap();
        // square image fits as 100x100 in the middle third
        assert_eq!(pad.surface().get_pixel(50, 50)[3], 0);
        assert_eq!(pad.surface().get_pixel(150, 50), &Rgba([0, 0, 255, 255]));

        let mut sink = Recorder::default();
        let events = [
            PointerEvent::new(PointerAction::Press, 0.0, 5.0),
            PointerEvent::new(PointerAction::Move, 40.0, 5.0),
            PointerEvent::new(PointerAction::Release, 40.0, 5.0),
        ];
        pad.replay(&events, &mut sink).unwrap();
        let before = pad.surface().clone();
        pad.sync(sink.0.last().map(String::as_str)).unwrap();
        assert_eq!(pad.surface(), &before);

        pad.sync(Some("")).unwrap();
        assert!(pad.surface().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn store_receives_signature_field() {
        use crate::cache::MemoryCache;

        let mut store = DocumentStore::initialize(MemoryCache::new());
        let mut pad = SignaturePad::new();
        let events = [
            PointerEvent::new(PointerAction::Press, 1.0, 1.0),
            PointerEvent::new(PointerAction::Move, 9.0, 9.0),
            PointerEvent::new(PointerAction::Release, 9.0, 9.0),
        ];
        pad.replay(&events, &mut store).unwrap();
        assert!(store.document().company.signature().is_some());
        assert_eq!(store.cache().writes(), 1);
    }
}
