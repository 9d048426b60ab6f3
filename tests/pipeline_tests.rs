//! End-to-end tests of the rendering pipeline against a recording
//! surface.

use std::rc::Rc;

use smallvec::smallvec;

use pdf_x_render::{
    BoundedCache, ColorMap, Decoded, DeviceFont, FillRule, FontId, FontLoader, GlyphFace,
    GraphicsState, OutlineSink, PackedSampleReader, RenderingContext, Rgb, SourceFont, SurfaceOp,
    TestSurface,
};

// === Test fonts ===

struct NullFace;

impl GlyphFace for NullFace {
    fn outline(&self, _glyph: u32, _sink: &mut dyn OutlineSink) -> bool {
        false
    }
    fn units_per_em(&self) -> u16 {
        1000
    }
}

struct IdentityFont;

impl DeviceFont for IdentityFont {
    fn face(&self) -> Rc<dyn GlyphFace> {
        Rc::new(NullFace)
    }
    fn glyph(&self, code: u32, _unicode: &[u32]) -> u32 {
        code
    }
}

/// Single-byte encoding with a unit advance per character.
struct ByteFont;

impl SourceFont for ByteFont {
    fn id(&self) -> FontId {
        FontId(1)
    }
    fn next_char(&self, bytes: &[u8]) -> Decoded {
        Decoded {
            code: bytes[0] as u32,
            unicode: smallvec![bytes[0] as u32],
            advance: (1.0, 0.0),
            origin: (0.0, 0.0),
            consumed: 1,
        }
    }
}

struct StubLoader;

impl FontLoader for StubLoader {
    fn load(&mut self, _source: &dyn SourceFont) -> Option<Rc<dyn DeviceFont>> {
        Some(Rc::new(IdentityFont))
    }
}

fn context() -> RenderingContext<TestSurface> {
    let mut ctx = RenderingContext::new(TestSurface::new());
    ctx.start_doc(Box::new(StubLoader));
    ctx
}

fn text_state() -> GraphicsState {
    let mut state = GraphicsState::new();
    state.font = Some(Rc::new(ByteFont));
    state.font_size = 12.0;
    state
}

// === Path emission ===

#[test]
fn path_vertices_transform_in_order() {
    let mut ctx = context();
    let mut state = GraphicsState::new();
    state.set_ctm([2.0, 0.0, 0.0, -2.0, 10.0, 100.0]);

    state.path.move_to(1.0, 2.0);
    state.path.line_to(3.0, 4.0);
    state.path.curve_to(5.0, 6.0, 7.0, 8.0, 9.0, 10.0);
    state.path.close();
    state.path.move_to(0.0, 0.0);
    state.path.line_to(1.0, 0.0);

    let expect = |x: f64, y: f64| (2.0 * x + 10.0, -2.0 * y + 100.0);
    ctx.fill(&state);

    let ops = ctx.surface().ops();
    assert_eq!(ops[0], SurfaceOp::MoveTo(expect(1.0, 2.0).0, expect(1.0, 2.0).1));
    assert_eq!(ops[1], SurfaceOp::LineTo(expect(3.0, 4.0).0, expect(3.0, 4.0).1));
    let (c1x, c1y) = expect(5.0, 6.0);
    let (c2x, c2y) = expect(7.0, 8.0);
    let (ex, ey) = expect(9.0, 10.0);
    assert_eq!(ops[2], SurfaceOp::CurveTo(c1x, c1y, c2x, c2y, ex, ey));
    assert_eq!(ops[3], SurfaceOp::ClosePath);
    assert_eq!(ops[4], SurfaceOp::MoveTo(expect(0.0, 0.0).0, expect(0.0, 0.0).1));
    assert_eq!(ops[5], SurfaceOp::LineTo(expect(1.0, 0.0).0, expect(1.0, 0.0).1));
}

#[test]
fn single_point_subpath_emits_only_its_move() {
    let mut ctx = context();
    let mut state = GraphicsState::new();
    state.path.move_to(1.0, 1.0);

    ctx.stroke(&state);
    assert_eq!(
        ctx.surface().count(|op| matches!(op, SurfaceOp::MoveTo(..))),
        1
    );
    assert_eq!(
        ctx.surface().count(|op| matches!(op, SurfaceOp::LineTo(..))),
        0
    );
}

// === Save/restore ===

#[test]
fn save_restore_roundtrips_state_and_redirties_font() {
    let mut ctx = context();
    let mut state = text_state();
    state.line_width = 2.0;
    state.dash = pdf_x_render::DashPattern::new([4.0, 2.0], 1.0);
    state.miter_limit = 5.0;
    state.flatness = 0.5;
    state.fill_color = Rgb::new(0.2, 0.4, 0.6);

    // Interpreter-side save: push a copy.
    let saved = state.clone();
    ctx.save_state(&state);

    state.line_width = 9.0;
    state.fill_color = Rgb::new(1.0, 1.0, 1.0);
    state.dash = pdf_x_render::DashPattern::default();

    // Interpreter-side restore: pop back to the copy.
    state = saved;
    ctx.restore_state(&state);

    assert_eq!(state.line_width, 2.0);
    assert_eq!(state.fill_color, Rgb::new(0.2, 0.4, 0.6));
    assert_eq!(state.dash.lengths.as_slice(), &[4.0, 2.0]);
    assert_eq!(state.miter_limit, 5.0);
    assert_eq!(state.flatness, 0.5);

    // The restore re-marks the font dirty: the next text operation
    // installs the font again.
    ctx.draw_string(&state, b"a");
    let fonts_installed = ctx.surface().count(|op| matches!(op, SurfaceOp::SetFont(_)));
    assert_eq!(fonts_installed, 1);

    ctx.save_state(&state);
    ctx.restore_state(&state);
    ctx.draw_string(&state, b"a");
    let fonts_installed = ctx.surface().count(|op| matches!(op, SurfaceOp::SetFont(_)));
    assert_eq!(fonts_installed, 2);

    // Without a restore in between, the font stays installed.
    ctx.draw_string(&state, b"a");
    let fonts_installed = ctx.surface().count(|op| matches!(op, SurfaceOp::SetFont(_)));
    assert_eq!(fonts_installed, 2);
}

// === Clipping ===

#[test]
fn clip_consumes_the_path_buffer() {
    let mut ctx = context();
    let mut state = GraphicsState::new();
    state.path.rect(0.0, 0.0, 50.0, 50.0);

    ctx.clip(&mut state, false);
    assert!(state.path.is_empty());

    // Second clip with no new path: nothing is emitted before the clip.
    ctx.surface_mut().clear_ops();
    ctx.eo_clip(&mut state);
    let ops = ctx.surface().ops();
    assert_eq!(ops[0], SurfaceOp::Clip(FillRule::EvenOdd));
    assert_eq!(ops[1], SurfaceOp::ClearPath);
}

#[test]
fn fill_does_not_consume_the_path_buffer() {
    let mut ctx = context();
    let mut state = GraphicsState::new();
    state.path.rect(0.0, 0.0, 50.0, 50.0);

    ctx.fill(&state);
    assert!(!state.path.is_empty());
}

// === Text ===

#[test]
fn horizontal_advance_includes_word_space_once() {
    let mut ctx = context();
    let mut state = text_state();
    state.word_space = 6.0;
    state.horiz_scaling = 0.8;

    ctx.draw_string(&state, b"A B");
    let run = ctx
        .surface()
        .ops()
        .iter()
        .find_map(|op| match op {
            SurfaceOp::ShowGlyphs(run) => Some(run.clone()),
            _ => None,
        })
        .expect("no glyph run emitted");

    // Advance per glyph: 1.0 * 12 * 0.8 = 9.6; the single space byte
    // contributes (12 + 6) * 0.8 = 14.4 exactly once.
    let per_glyph = 12.0 * 0.8;
    let with_word_space = (12.0 + 6.0) * 0.8;
    assert_eq!(run.len(), 3);
    assert!((run[1].x - per_glyph).abs() < 1e-9);
    assert!((run[2].x - (per_glyph + with_word_space)).abs() < 1e-9);
}

#[test]
fn invisible_render_mode_emits_nothing() {
    let mut ctx = context();
    let mut state = text_state();

    // Clear the dirty flag first.
    ctx.draw_string(&state, b"x");
    ctx.surface_mut().clear_ops();

    state.render_mode = 3;
    ctx.draw_string(&state, b"invisible");
    assert!(ctx.surface().ops().is_empty());

    // The flag stayed clear: a visible draw needs no new font install.
    state.render_mode = 0;
    ctx.draw_string(&state, b"x");
    assert_eq!(ctx.surface().count(|op| matches!(op, SurfaceOp::SetFont(_))), 0);
}

#[test]
fn stroke_render_mode_uses_stroke_color() {
    let mut ctx = context();
    let mut state = text_state();
    state.stroke_color = Rgb::new(0.0, 1.0, 0.0);
    state.render_mode = 1;
    ctx.update_stroke_color(&state);

    ctx.draw_string(&state, b"ok");
    let ops = ctx.surface().ops();
    let stroke_pos = ops.iter().position(|op| matches!(op, SurfaceOp::Stroke)).unwrap();
    assert!(ops[..stroke_pos].contains(&SurfaceOp::SetSourceRgb(Rgb::new(0.0, 1.0, 0.0))));
    assert_eq!(ctx.surface().count(|op| matches!(op, SurfaceOp::ShowGlyphs(_))), 0);
}

#[test]
fn glyph_positions_follow_the_full_transform() {
    let mut ctx = context();
    let mut state = text_state();
    state.set_ctm([1.0, 0.0, 0.0, -1.0, 0.0, 800.0]);
    state.set_text_matrix([1.0, 0.0, 0.0, 1.0, 100.0, 700.0]);

    ctx.draw_string(&state, b"ab");
    let run = ctx
        .surface()
        .ops()
        .iter()
        .find_map(|op| match op {
            SurfaceOp::ShowGlyphs(run) => Some(run.clone()),
            _ => None,
        })
        .unwrap();

    // Pen starts at (100, 700) user space; the page flip maps it to
    // (100, 100) device space. The second glyph advances 12 units right.
    assert_eq!((run[0].x, run[0].y), (100.0, 100.0));
    assert_eq!((run[1].x, run[1].y), (112.0, 100.0));
    assert_eq!(run[0].index, 'a' as u32);
    assert_eq!(run[1].index, 'b' as u32);
}

// === Images ===

#[test]
fn image_mask_invert_flips_sample_mapping() {
    let samples = [0b1000_0000u8]; // one row: 1, 0
    let mut state = GraphicsState::new();
    state.set_ctm([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);

    for (invert, first, second) in [(false, 0u8, 255u8), (true, 255, 0)] {
        let mut ctx = context();
        let mut reader = PackedSampleReader::new(&samples, 2, 1);
        ctx.draw_image_mask(&state, &mut reader, 2, 1, invert, false);

        let ops = ctx.surface().ops();
        let found = ops.iter().any(|op| matches!(
            op,
            SurfaceOp::MaskImage { data, .. } if data[0] == first && data[1] == second
        ));
        assert!(found, "invert={} expected [{}, {}]", invert, first, second);
    }
}

struct TwoCompMap;

impl ColorMap for TwoCompMap {
    fn num_pixel_comps(&self) -> usize {
        2
    }
    fn bits(&self) -> u8 {
        8
    }
    fn rgb(&self, samples: &[u8]) -> Rgb {
        Rgb::new(samples[0] as f64 / 255.0, samples[1] as f64 / 255.0, 0.0)
    }
}

#[test]
fn color_key_masks_only_fully_matching_pixels() {
    // 2x2, two components per pixel. Only the first pixel matches both
    // transparent ranges.
    let samples = [
        10u8, 10, /**/ 10, 200, //
        200, 10, /**/ 200, 200,
    ];
    let mut state = GraphicsState::new();
    state.set_ctm([4.0, 0.0, 0.0, 4.0, 0.0, 0.0]);

    let mut ctx = context();
    let mut reader = PackedSampleReader::new(&samples, 4, 8);
    let ranges = [(0u8, 50u8), (0u8, 50u8)];
    ctx.draw_image(&state, &mut reader, 2, 2, &TwoCompMap, Some(&ranges), false);

    let ops = ctx.surface().ops();
    let data = ops
        .iter()
        .find_map(|op| match op {
            SurfaceOp::PaintImage { data, .. } => Some(data.clone()),
            _ => None,
        })
        .expect("no image painted");

    let alphas: Vec<u8> = data.chunks_exact(4).map(|px| px[3]).collect();
    assert_eq!(alphas, vec![0, 255, 255, 255]);
}

#[test]
fn image_pixels_pack_bgr() {
    struct PassthroughRgb;
    impl ColorMap for PassthroughRgb {
        fn num_pixel_comps(&self) -> usize {
            3
        }
        fn bits(&self) -> u8 {
            8
        }
        fn rgb(&self, samples: &[u8]) -> Rgb {
            Rgb::new(
                samples[0] as f64 / 255.0,
                samples[1] as f64 / 255.0,
                samples[2] as f64 / 255.0,
            )
        }
    }

    let samples = [255u8, 128, 0];
    let mut state = GraphicsState::new();
    state.set_ctm([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    let mut ctx = context();
    let mut reader = PackedSampleReader::new(&samples, 3, 8);
    ctx.draw_image(&state, &mut reader, 1, 1, &PassthroughRgb, None, false);

    let ops = ctx.surface().ops();
    let data = ops
        .iter()
        .find_map(|op| match op {
            SurfaceOp::PaintImage { data, .. } => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(data, vec![0, 128, 255, 255]);
}

// === Cache ===

#[test]
fn cache_evicts_least_recently_used_on_overflow() {
    let mut cache = BoundedCache::new(3);
    for key in 1u32..=3 {
        cache.put(key, key * 10);
    }
    cache.put(4, 40);
    assert!(cache.lookup(&1).is_none());
    assert_eq!(cache.lookup(&4), Some(&40));
}

#[test]
fn cache_lookup_changes_eviction_order() {
    let mut touched = BoundedCache::new(3);
    let mut untouched = BoundedCache::new(3);
    for cache in [&mut touched, &mut untouched] {
        for key in 1u32..=3 {
            cache.put(key, ());
        }
    }

    assert!(touched.lookup(&1).is_some());
    touched.put(4, ());
    untouched.put(4, ());

    // The promoted key survives in one cache and not the other.
    assert!(touched.lookup(&1).is_some());
    assert!(touched.lookup(&2).is_none());
    assert!(untouched.lookup(&1).is_none());
    assert!(untouched.lookup(&2).is_some());
}
