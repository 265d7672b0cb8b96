//! Filter graph construction for the layered cover render.
//!
//! Input `#0` is the looped cover image, input `#1` the audio. The graph
//! produces one labelled video stream, [`VIDEO_OUT`].

use pcast_models::encoding::{
    BALANCED_BLUR_DIVISOR, PIXEL_FORMAT, QUALITY_BLUR_SIGMA, WAVEFORM_BOTTOM_MARGIN,
};
use pcast_models::{Canvas, RenderRequest, RenderTier};

/// Image input stream.
pub const IMAGE_INPUT: &str = "0:v";
/// Audio input stream.
pub const AUDIO_INPUT: &str = "1:a";
/// Final composited video label.
pub const VIDEO_OUT: &str = "[v]";

/// Total zoom reached by the end of an animated short.
const SHORT_ZOOM_SPAN: f64 = 0.10;

/// An ffmpeg `-filter_complex` graph, one chain per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGraph {
    chains: Vec<String>,
}

impl FilterGraph {
    /// Graph for `request` rendering `duration` seconds of audio.
    ///
    /// `duration` only drives the zoom speed of animated shorts; pass 0 when
    /// it is unknown.
    pub fn build(request: &RenderRequest, duration: f64) -> Self {
        let canvas = request.canvas;
        let tier = request.tier;
        let mut chains = Vec::new();

        let fg_source = if tier.uses_image_background() {
            chains.push(format!("[{IMAGE_INPUT}]split=2[bgsrc][fgsrc]"));
            "[fgsrc]".to_string()
        } else {
            format!("[{IMAGE_INPUT}]")
        };

        chains.push(background(request, duration));
        chains.push(foreground(&fg_source, canvas, request.foreground_scale));
        chains.push("[bg][fg]overlay=x=(W-w)/2:y=(H-h)/2[base]".to_string());
        chains.push(waveform(canvas, request.waveform_height, tier.fps()));
        chains.push(format!(
            "[base][wave]overlay=x=0:y={}:shortest=1,format={}{}",
            waveform_y(canvas, request.waveform_height),
            PIXEL_FORMAT,
            VIDEO_OUT
        ));

        Self { chains }
    }

    pub fn chains(&self) -> &[String] {
        &self.chains
    }

    pub fn to_filter_complex(&self) -> String {
        self.chains.join(";")
    }
}

fn background(request: &RenderRequest, duration: f64) -> String {
    let Canvas { width, height } = request.canvas;
    let tier = request.tier;
    let fps = tier.fps();

    match tier {
        RenderTier::Turbo => format!(
            "color=c={}:s={}x{}:r={}[bg]",
            request.background_color.to_ffmpeg(),
            width,
            height,
            fps
        ),
        RenderTier::Balanced => format!(
            "[bgsrc]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},\
             scale={sw}:{sh},scale={w}:{h},eq=brightness={b:.2},setsar=1[bg]",
            w = width,
            h = height,
            sw = even(width as f64 / BALANCED_BLUR_DIVISOR as f64),
            sh = even(height as f64 / BALANCED_BLUR_DIVISOR as f64),
            b = tier.background_brightness(),
        ),
        RenderTier::Quality => {
            let zoom = tier.background_zoom();
            let zw = even(width as f64 * zoom);
            let zh = even(height as f64 * zoom);
            let mut chain = format!(
                "[bgsrc]scale={zw}:{zh}:force_original_aspect_ratio=increase,crop={zw}:{zh}"
            );
            if request.is_short() && tier.animates_shorts() {
                let frames = (duration * fps as f64).max(1.0);
                chain.push_str(&format!(
                    ",zoompan=z='min(1+{rate:.8}*on,{max:.2})':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={zw}x{zh}:fps={fps}",
                    rate = SHORT_ZOOM_SPAN / frames,
                    max = 1.0 + SHORT_ZOOM_SPAN,
                ));
            }
            chain.push_str(&format!(
                ",crop={width}:{height},gblur=sigma={QUALITY_BLUR_SIGMA},eq=brightness={b:.2},setsar=1[bg]",
                b = tier.background_brightness(),
            ));
            chain
        }
    }
}

fn foreground(source: &str, canvas: Canvas, scale: f64) -> String {
    let side = canvas.foreground_box(scale);
    format!(
        "{source}scale={side}:{side}:force_original_aspect_ratio=decrease:force_divisible_by=2,setsar=1[fg]"
    )
}

fn waveform(canvas: Canvas, band: u32, fps: u32) -> String {
    format!(
        "[{AUDIO_INPUT}]showwaves=s={}x{}:mode=line:rate={}:colors=white,format=rgba[wave]",
        canvas.width, band, fps
    )
}

/// Top edge of the waveform band.
fn waveform_y(canvas: Canvas, band: u32) -> u32 {
    canvas
        .height
        .saturating_sub(band)
        .saturating_sub(WAVEFORM_BOTTOM_MARGIN)
}

fn even(value: f64) -> u32 {
    let v = value.round().max(2.0) as u32;
    v + (v % 2)
}
