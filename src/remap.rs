//! Mapping true-color pixels onto a fixed palette

use crate::palette::Palette;
use imgref::{ImgRef, ImgVec};
use rgb::{RGB8, RGBA8};
use std::collections::HashMap;
use std::str::FromStr;

/// How to hide banding when a color isn't in the palette
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Dither {
    /// Always the nearest color
    None,
    /// 8×8 Bayer threshold matrix. Stable between frames, so it doesn't shimmer.
    Ordered,
    /// Error diffusion, with strength 0.0–1.0
    FloydSteinberg(f32),
}

impl Default for Dither {
    fn default() -> Self {
        Self::FloydSteinberg(0.5)
    }
}

/// `none`, `ordered`, `floyd-steinberg` or `floyd-steinberg:0.8`
impl FromStr for Dither {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let (name, level) = match s.split_once(':') {
            Some((name, level)) => (name, Some(level)),
            None => (s, None),
        };
        match (name.trim(), level) {
            ("none", None) => Ok(Self::None),
            ("ordered" | "bayer", None) => Ok(Self::Ordered),
            ("floyd-steinberg" | "fs", None) => Ok(Self::default()),
            ("floyd-steinberg" | "fs", Some(level)) => match level.trim().parse::<f32>() {
                Ok(l) if (0. ..=1.).contains(&l) => Ok(Self::FloydSteinberg(l)),
                _ => Err(format!("dithering strength must be between 0 and 1, got {level}")),
            },
            _ => Err(format!("unknown dithering mode '{s}' (expected none, ordered or floyd-steinberg)")),
        }
    }
}

const DITHER: [u8; 64] = [
     0*2+8,48*2+8,12*2+8,60*2+8, 3*2+8,51*2+8,15*2+8,63*2+8,
    32*2+8,16*2+8,44*2+8,28*2+8,35*2+8,19*2+8,47*2+8,31*2+8,
     8*2+8,56*2+8, 4*2+8,52*2+8,11*2+8,59*2+8, 7*2+8,55*2+8,
    40*2+8,24*2+8,36*2+8,20*2+8,43*2+8,27*2+8,39*2+8,23*2+8,
     2*2+8,50*2+8,14*2+8,62*2+8, 1*2+8,49*2+8,13*2+8,61*2+8,
    34*2+8,18*2+8,46*2+8,30*2+8,33*2+8,17*2+8,45*2+8,29*2+8,
    10*2+8,58*2+8, 6*2+8,54*2+8, 9*2+8,57*2+8, 5*2+8,53*2+8,
    42*2+8,26*2+8,38*2+8,22*2+8,41*2+8,25*2+8,37*2+8,21*2+8];

/// Perceptually-weighted squared distance; green matters most, blue least
#[inline]
pub fn colordiff(a: RGB8, b: RGB8) -> u32 {
    let dr = i32::from(a.r) - i32::from(b.r);
    let dg = i32::from(a.g) - i32::from(b.g);
    let db = i32::from(a.b) - i32::from(b.b);
    (dr * dr * 2 + dg * dg * 3 + db * db) as u32
}

/// Finds nearest palette entries, remembering answers for colors seen before
pub struct Remapper<'pal> {
    palette: &'pal [RGB8],
    /// half the distance from each entry to its closest neighbour;
    /// anything nearer than that can't have a better match
    radius: Vec<u32>,
    cache: HashMap<RGB8, u8>,
    dither: Dither,
}

impl<'pal> Remapper<'pal> {
    pub fn new(palette: &'pal Palette, dither: Dither) -> Self {
        let colors = palette.colors();
        let radius = colors.iter().enumerate().map(|(i, &c)| {
            colors.iter().enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &o)| colordiff(c, o) / 4)
                .min()
                .unwrap_or(u32::MAX)
        }).collect();
        Self {
            palette: colors,
            radius,
            cache: HashMap::new(),
            dither,
        }
    }

    /// Index of the closest entry. Ties go to the lower index.
    pub fn nearest(&mut self, px: RGB8) -> u8 {
        if let Some(&idx) = self.cache.get(&px) {
            return idx;
        }
        let mut best = 0;
        let mut best_diff = u32::MAX;
        for (i, (&c, &radius)) in self.palette.iter().zip(&self.radius).enumerate() {
            let diff = colordiff(px, c);
            if diff < best_diff {
                best = i;
                best_diff = diff;
                if diff < radius {
                    break;
                }
            }
        }
        let best = best as u8;
        if self.cache.len() < 1 << 16 {
            self.cache.insert(px, best);
        }
        best
    }

    /// Palette indices for every pixel of an opaque frame
    pub fn remap(&mut self, frame: ImgRef<'_, RGBA8>) -> ImgVec<u8> {
        let (width, height) = (frame.width(), frame.height());
        let mut out = Vec::with_capacity(width * height);
        match self.dither {
            Dither::None => {
                for px in frame.pixels() {
                    out.push(self.nearest(px.rgb()));
                }
            },
            Dither::Ordered => {
                for (y, row) in frame.rows().enumerate() {
                    for (x, px) in row.iter().enumerate() {
                        // thresholds 8..134, centered and scaled down to ±15
                        let offset = (i16::from(DITHER[(y & 7) * 8 + (x & 7)]) - 71) / 4;
                        let shift = |c: u8| (i16::from(c) + offset).clamp(0, 255) as u8;
                        out.push(self.nearest(RGB8::new(shift(px.r), shift(px.g), shift(px.b))));
                    }
                }
            },
            Dither::FloydSteinberg(level) => {
                self.diffuse(frame, level, &mut out);
            },
        }
        ImgVec::new(out, width, height)
    }

    fn diffuse(&mut self, frame: ImgRef<'_, RGBA8>, level: f32, out: &mut Vec<u8>) {
        let width = frame.width();
        // errors for this row and the next, with a spare column on each side
        let mut curr = vec![[0f32; 3]; width + 2];
        let mut next = vec![[0f32; 3]; width + 2];
        for row in frame.rows() {
            for (x, px) in row.iter().enumerate() {
                let err = curr[x + 1];
                let want = [
                    f32::from(px.r) + err[0],
                    f32::from(px.g) + err[1],
                    f32::from(px.b) + err[2],
                ];
                let clamped = RGB8::new(
                    want[0].round().clamp(0., 255.) as u8,
                    want[1].round().clamp(0., 255.) as u8,
                    want[2].round().clamp(0., 255.) as u8,
                );
                let idx = self.nearest(clamped);
                out.push(idx);

                let got = self.palette[idx as usize];
                let e = [
                    (want[0] - f32::from(got.r)) * level,
                    (want[1] - f32::from(got.g)) * level,
                    (want[2] - f32::from(got.b)) * level,
                ];
                for c in 0..3 {
                    curr[x + 2][c] += e[c] * 7. / 16.;
                    next[x][c] += e[c] * 3. / 16.;
                    next[x + 1][c] += e[c] * 5. / 16.;
                    next[x + 2][c] += e[c] * 1. / 16.;
                }
            }
            std::mem::swap(&mut curr, &mut next);
            next.iter_mut().for_each(|e| *e = [0.; 3]);
        }
    }
}
