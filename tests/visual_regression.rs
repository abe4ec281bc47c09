//! Headless, GPU-backed end-to-end tests: build a tiny command stream,
//! execute it against an offscreen target, and check pixel output.

use animcore::geom::Matrix2D;
use animcore::{
    AssetTextureTable, Command, LineCap, LineJoin, MaskMode, MatteMode, MutableTextureProvider,
    PathId, PathResource, Renderer, RendererOptions,
};
use futures::executor::block_on;

fn white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("white_1x1"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Bgra8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255, 255, 255, 255],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// A square covering the whole 0..1 animation-space unit box, for shapes
/// used as mask/matte sources.
fn unit_square_path() -> PathResource {
    PathResource::static_single(
        4,
        vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
        vec![0, 1, 2, 0, 2, 3],
    )
}

/// A square covering only the left half of the 0..1 animation-space box.
fn left_half_square_path() -> PathResource {
    PathResource::static_single(
        4,
        vec![0.0, 0.0, 0.5, 0.0, 0.5, 1.0, 0.0, 1.0],
        vec![0, 1, 2, 0, 2, 3],
    )
}

/// A flat horizontal line across the middle of the 0..1 animation-space box,
/// for stroke tests.
fn horizontal_line_path() -> PathResource {
    PathResource::static_single(2, vec![0.0, 0.5, 1.0, 0.5], vec![])
}

/// A 1x1 texture of a uniform gray shade (straight alpha, fully opaque),
/// used as a luma matte source.
fn gray_texture(device: &wgpu::Device, queue: &wgpu::Queue, shade: u8) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("gray_1x1"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Bgra8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[shade, shade, shade, 255],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * width + x) * 4) as usize;
    [
        pixels[offset],
        pixels[offset + 1],
        pixels[offset + 2],
        pixels[offset + 3],
    ]
}

#[test]
fn single_opaque_image_covers_the_full_canvas() {
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    let mut textures = AssetTextureTable::new();
    textures.set("w", white_texture(renderer.device(), renderer.queue()));

    let commands = vec![
        Command::BeginGroup("r".into()),
        Command::PushTransform(Matrix2D::IDENTITY),
        Command::DrawImage {
            asset_key: "w".into(),
            opacity: 1.0,
        },
        Command::PopTransform,
        Command::EndGroup,
    ];

    let pixels = renderer
        .render_to_bgra8(&commands, (32, 32), (1.0, 1.0), &textures)
        .expect("render succeeds");

    let center = pixel_at(&pixels, 32, 16, 16);
    assert!(center[3] > 0, "center pixel should be opaque, got {:?}", center);
}

#[test]
fn translated_sprite_only_covers_its_shifted_half() {
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    let mut textures = AssetTextureTable::new();
    textures.set("w", white_texture(renderer.device(), renderer.queue()));

    // Translate by half the anim-space width so the 1x1 sprite only covers
    // the right half of a 2x1 canvas.
    let translate = Matrix2D::translation(1.0, 0.0);
    let commands = vec![
        Command::BeginGroup("r".into()),
        Command::PushTransform(translate),
        Command::DrawImage {
            asset_key: "w".into(),
            opacity: 1.0,
        },
        Command::PopTransform,
        Command::EndGroup,
    ];

    let pixels = renderer
        .render_to_bgra8(&commands, (32, 16), (2.0, 1.0), &textures)
        .expect("render succeeds");

    let left = pixel_at(&pixels, 32, 4, 8);
    let right = pixel_at(&pixels, 32, 28, 8);
    assert_eq!(left[3], 0, "left half should stay transparent, got {:?}", left);
    assert!(right[3] > 0, "right half should be covered, got {:?}", right);
}

#[test]
fn declared_asset_size_override_sizes_the_quad_in_local_units() {
    // spec.md §8 scenario (b): target 32x32, anim-size 32x32, an asset
    // declared 8x8 drawn after Translate(16, 0); the quad should only cover
    // the 8x8 local-unit square at its translated position, not the whole
    // canvas.
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    let mut textures = AssetTextureTable::new();
    textures.set("w", white_texture(renderer.device(), renderer.queue()));
    let mut asset_sizes = animcore::ahash::AHashMap::default();
    asset_sizes.insert("w".to_string(), (8, 8));

    let commands = vec![
        Command::BeginGroup("r".into()),
        Command::PushTransform(Matrix2D::translation(16.0, 0.0)),
        Command::DrawImage {
            asset_key: "w".into(),
            opacity: 1.0,
        },
        Command::PopTransform,
        Command::EndGroup,
    ];

    let pixels = renderer
        .render_to_bgra8_with_asset_sizes(&commands, (32, 32), (32.0, 32.0), &textures, Some(&asset_sizes))
        .expect("render succeeds");

    let outside = pixel_at(&pixels, 32, 4, 4);
    let inside = pixel_at(&pixels, 32, 20, 4);
    let past_the_quad = pixel_at(&pixels, 32, 20, 20);
    assert_eq!(outside[3], 0, "outside the declared 8x8 quad should stay transparent, got {:?}", outside);
    assert!(inside[3] > 0, "inside the translated 8x8 quad should be covered, got {:?}", inside);
    assert_eq!(
        past_the_quad[3], 0,
        "below the declared quad's 8px height should stay transparent, got {:?}",
        past_the_quad
    );
}

#[test]
fn clip_rect_restricts_the_drawn_area() {
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    let mut textures = AssetTextureTable::new();
    textures.set("w", white_texture(renderer.device(), renderer.queue()));

    let commands = vec![
        Command::BeginGroup("r".into()),
        Command::PushClipRect(animcore::geom::Rect::new(0.0, 0.0, 0.5, 1.0)),
        Command::DrawImage {
            asset_key: "w".into(),
            opacity: 1.0,
        },
        Command::PopClipRect,
        Command::EndGroup,
    ];

    let pixels = renderer
        .render_to_bgra8(&commands, (32, 32), (1.0, 1.0), &textures)
        .expect("render succeeds");

    let inside = pixel_at(&pixels, 32, 4, 16);
    let outside = pixel_at(&pixels, 32, 28, 16);
    assert!(inside[3] > 0, "inside the clip rect should be covered, got {:?}", inside);
    assert_eq!(outside[3], 0, "outside the clip rect should stay transparent, got {:?}", outside);
}

#[test]
fn mask_add_then_subtract_carves_out_the_overlap() {
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    renderer
        .path_registry_mut()
        .insert(PathId(0), unit_square_path());
    renderer
        .path_registry_mut()
        .insert(PathId(1), left_half_square_path());
    let mut textures = AssetTextureTable::new();
    textures.set("w", white_texture(renderer.device(), renderer.queue()));

    // BeginMask chain is emitted in LIFO (compiler) order: the add op is
    // nearest the content and must be listed first in application order
    // after reversal, so here the add op (full square) is the *outer*
    // BeginMask and the subtract op (left half) the *inner* one.
    let commands = vec![
        Command::BeginGroup("r".into()),
        Command::BeginMask {
            mode: MaskMode::Subtract,
            inverted: false,
            path: PathId(1),
            opacity: 1.0,
            frame: 0.0,
        },
        Command::BeginMask {
            mode: MaskMode::Add,
            inverted: false,
            path: PathId(0),
            opacity: 1.0,
            frame: 0.0,
        },
        Command::DrawImage {
            asset_key: "w".into(),
            opacity: 1.0,
        },
        Command::EndMask,
        Command::EndMask,
        Command::EndGroup,
    ];

    let pixels = renderer
        .render_to_bgra8(&commands, (32, 32), (1.0, 1.0), &textures)
        .expect("render succeeds");

    let left = pixel_at(&pixels, 32, 8, 16);
    let right = pixel_at(&pixels, 32, 24, 16);
    assert_eq!(
        left[3], 0,
        "subtracted left half should stay uncovered, got {:?}",
        left
    );
    assert!(
        right[3] > 0,
        "right half outside the subtraction should remain covered, got {:?}",
        right
    );
}

#[test]
fn draw_shape_fills_only_its_own_half_of_the_canvas() {
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    renderer
        .path_registry_mut()
        .insert(PathId(0), left_half_square_path());

    let commands = vec![
        Command::BeginGroup("r".into()),
        Command::DrawShape {
            path: PathId(0),
            fill_color: Some([255, 0, 0, 255]),
            fill_opacity: 1.0,
            layer_opacity: 1.0,
            frame: 0.0,
        },
        Command::EndGroup,
    ];

    let textures = AssetTextureTable::new();
    let pixels = renderer
        .render_to_bgra8(&commands, (32, 32), (1.0, 1.0), &textures)
        .expect("render succeeds");

    let left = pixel_at(&pixels, 32, 8, 16);
    let right = pixel_at(&pixels, 32, 24, 16);
    assert!(left[3] > 0, "left half (inside the filled shape) should be covered, got {:?}", left);
    assert_eq!(right[3], 0, "right half (outside the filled shape) should stay transparent, got {:?}", right);
}

#[test]
fn draw_stroke_covers_a_band_around_its_path_and_nothing_else() {
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    renderer
        .path_registry_mut()
        .insert(PathId(0), horizontal_line_path());

    let commands = vec![
        Command::BeginGroup("r".into()),
        Command::DrawStroke {
            path: PathId(0),
            stroke_color: [0, 0, 255, 255],
            stroke_opacity: 1.0,
            stroke_width: 0.1,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 4.0,
            layer_opacity: 1.0,
            frame: 0.0,
        },
        Command::EndGroup,
    ];

    let textures = AssetTextureTable::new();
    let pixels = renderer
        .render_to_bgra8(&commands, (32, 32), (1.0, 1.0), &textures)
        .expect("render succeeds");

    // The line sits at animation-space y=0.5, i.e. viewport row 16; a point
    // far above it (row 2) should fall outside even a generously wide stroke.
    let on_line = pixel_at(&pixels, 32, 16, 16);
    let far_from_line = pixel_at(&pixels, 32, 16, 2);
    assert!(on_line[3] > 0, "pixel on the stroked line should be covered, got {:?}", on_line);
    assert_eq!(far_from_line[3], 0, "pixel far from the stroked line should stay transparent, got {:?}", far_from_line);
}

#[test]
fn luma_matte_multiplies_consumer_by_source_luma() {
    // spec.md §8 scenario (e): a 50%-gray matte source over a white
    // consumer under `MatteMode::Luma` should multiply the consumer by
    // roughly 0.5 wherever the source covers it.
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    let mut textures = AssetTextureTable::new();
    textures.set("gray", gray_texture(renderer.device(), renderer.queue(), 128));
    textures.set("w", white_texture(renderer.device(), renderer.queue()));

    let commands = vec![
        Command::BeginMatte(MatteMode::Luma),
        Command::BeginGroup("matteSource".into()),
        Command::DrawImage {
            asset_key: "gray".into(),
            opacity: 1.0,
        },
        Command::EndGroup,
        Command::BeginGroup("matteConsumer".into()),
        Command::DrawImage {
            asset_key: "w".into(),
            opacity: 1.0,
        },
        Command::EndGroup,
        Command::EndMatte,
    ];

    let pixels = renderer
        .render_to_bgra8(&commands, (8, 8), (1.0, 1.0), &textures)
        .expect("render succeeds");

    let center = pixel_at(&pixels, 8, 4, 4);
    assert!(
        center[3] > 80 && center[3] < 180,
        "matted alpha should land near half intensity for a 50% gray luma source, got {:?}",
        center
    );
    assert!(
        center[3] < 250,
        "matted pixel should be dimmed relative to the fully opaque consumer, got {:?}",
        center
    );
}

#[test]
fn empty_command_stream_renders_fully_transparent() {
    let mut renderer = block_on(Renderer::new_headless(RendererOptions::default()));
    let textures = AssetTextureTable::new();

    let pixels = renderer
        .render_to_bgra8(&[], (8, 8), (1.0, 1.0), &textures)
        .expect("render succeeds");

    assert!(pixels.iter().all(|&b| b == 0), "empty stream should produce a cleared, transparent target");
}
