//! Frame rates as exact fractions

use crate::error::*;
use std::fmt;
use std::str::FromStr;

/// Frames per second, kept as a reduced fraction so that NTSC-style rates
/// like `30000/1001` survive the trip through the containers unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// `num` frames every `den` seconds. Both must be non-zero.
    pub fn new(num: u32, den: u32) -> CatResult<Self> {
        if num == 0 || den == 0 {
            return Err(Error::Config(format!("frame rate {num}/{den} must be positive")));
        }
        let g = gcd(num, den);
        Ok(Self { num: num / g, den: den / g })
    }

    /// Whole frames per second
    pub fn fps(fps: u32) -> CatResult<Self> {
        Self::new(fps, 1)
    }

    pub fn numerator(self) -> u32 {
        self.num
    }

    pub fn denominator(self) -> u32 {
        self.den
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Presentation time of frame `index` in seconds
    pub fn timestamp(self, index: u64) -> f64 {
        index as f64 * f64::from(self.den) / f64::from(self.num)
    }

    /// GIF delay of frame `index` in 1/100s units.
    ///
    /// Delays alternate (e.g. 3,3,4 for 30fps) so the average rate is exact, like telecine pulldown.
    pub fn gif_delay(self, index: u64) -> u16 {
        let num = u128::from(self.num);
        let den = u128::from(self.den);
        let index = u128::from(index);
        let next = (index + 1) * 100 * den / num;
        let curr = index * 100 * den / num;
        (next - curr).min(u128::from(u16::MAX)) as u16
    }

    /// GIF can't show a frame for less than 1/100s
    pub fn fits_gif(self) -> bool {
        u64::from(self.num) <= 100 * u64::from(self.den)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Accepts `25`, `12.5` and `30000/1001`
impl FromStr for FrameRate {
    type Err = Error;

    fn from_str(s: &str) -> CatResult<Self> {
        let s = s.trim();
        let bad = || Error::Config(format!("'{s}' is not a frame rate"));
        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse().map_err(|_| bad())?;
            let den = den.trim().parse().map_err(|_| bad())?;
            return Self::new(num, den);
        }
        match s.split_once('.') {
            None => Self::new(s.parse().map_err(|_| bad())?, 1),
            Some((int, frac)) => {
                if frac.is_empty() || frac.len() > 6 || !frac.bytes().all(|c| c.is_ascii_digit()) {
                    return Err(bad());
                }
                let den = 10_u32.pow(frac.len() as u32);
                let int: u32 = if int.is_empty() { 0 } else { int.parse().map_err(|_| bad())? };
                let frac: u32 = frac.parse().map_err(|_| bad())?;
                let num = int.checked_mul(den).and_then(|n| n.checked_add(frac)).ok_or_else(bad)?;
                Self::new(num, den)
            },
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_decimal_and_fraction() {
        assert_eq!("5".parse::<FrameRate>().unwrap(), FrameRate::new(5, 1).unwrap());
        assert_eq!("12.5".parse::<FrameRate>().unwrap(), FrameRate::new(25, 2).unwrap());
        let ntsc: FrameRate = "30000/1001".parse().unwrap();
        assert_eq!((ntsc.numerator(), ntsc.denominator()), (30000, 1001));
        assert_eq!(FrameRate::new(50, 10).unwrap().to_string(), "5");
    }

    #[test]
    fn rejects_non_positive_and_garbage() {
        assert!("0".parse::<FrameRate>().is_err());
        assert!("5/0".parse::<FrameRate>().is_err());
        assert!("-3".parse::<FrameRate>().is_err());
        assert!("fast".parse::<FrameRate>().is_err());
        assert!("1.".parse::<FrameRate>().is_err());
    }

    #[test]
    fn delays_of_huge_rates_saturate() {
        let slow = FrameRate::new(1, u32::MAX).unwrap();
        assert_eq!(slow.gif_delay(u64::MAX - 1), u16::MAX);
        let odd = FrameRate::new(3, 4_000_000_000).unwrap();
        assert_eq!(odd.gif_delay(u64::MAX / 2), u16::MAX);
        let ntsc = FrameRate::new(30000, 1001).unwrap();
        assert!((3..=4).contains(&ntsc.gif_delay(u64::MAX - 1)));
    }

    #[test]
    fn pulldown_delays_average_out() {
        let rate = FrameRate::fps(30).unwrap();
        let delays: Vec<_> = (0..3).map(|i| rate.gif_delay(i)).collect();
        assert_eq!(delays, [3, 3, 4]);
        let total: u64 = (0..30).map(|i| u64::from(rate.gif_delay(i))).sum();
        assert_eq!(total, 100);

        let rate = FrameRate::fps(5).unwrap();
        assert!((0..10).all(|i| rate.gif_delay(i) == 20));
    }

    #[test]
    fn gif_limit() {
        assert!(FrameRate::fps(100).unwrap().fits_gif());
        assert!(!FrameRate::fps(120).unwrap().fits_gif());
        assert!((FrameRate::new(1, 3).unwrap().timestamp(2) - 6.0).abs() < 1e-9);
    }
}
