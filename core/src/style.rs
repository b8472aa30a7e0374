use colored::{Color, ColoredString, Colorize};

use crate::testing::JudgeCode;

#[macro_export]
macro_rules! print_success {
    ($fmt:literal, $($e:tt)*) => {
        use ::colored::Colorize as _;
        println!("{}", format!($fmt, $($e)*).green())
    }
}

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false
    };
    matches!(v.as_str(), "truecolor" | "24bit")
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for JudgeCode {
    fn color(&self) -> Color {
        use JudgeCode::*;
        if !self::is_truecolor_supported() {
            return match self {
                AC => Color::Green,
                WA => Color::Yellow,
                TLE | MLE => Color::Red,
                RE => Color::Magenta,
                DLE => Color::Blue,
                SE => Color::BrightBlack,
            };
        }

        let (r, g, b) = match self {
            AC => (30, 180, 40),
            WA => (210, 138, 4),
            TLE => (220, 42, 42),
            MLE => (200, 60, 90),
            RE => (171, 40, 200),
            DLE => (40, 90, 210),
            SE => (110, 110, 110),
        };
        Color::TrueColor { r, g, b }
    }
}

pub fn judge_icon(judge: JudgeCode) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {:<3} ", judge)
        .on_color(judge.color())
        .bold()
        .color(fg)
}
