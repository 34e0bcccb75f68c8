use euclid::default::Point2D;
use serde::{Deserialize, Serialize};

use crate::message::TextObject;

/// Drawing intents as the embedding's input layer produces them, before they
/// are tagged with a room and become wire events. Coordinates are canvas
/// pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DrawCommand {
    StrokeStart {
        point: Point2D<f32>,
        color: String,
        width: f32,
    },
    StrokeMove {
        point: Point2D<f32>,
        color: String,
        width: f32,
    },
    StrokeEnd,
    EraseStart {
        point: Point2D<f32>,
        width: f32,
    },
    EraseMove {
        point: Point2D<f32>,
        width: f32,
    },
    EraseEnd,
    Line {
        start: Point2D<f32>,
        end: Point2D<f32>,
        color: String,
        width: f32,
    },
    Circle {
        center: Point2D<f32>,
        radius: f32,
        color: String,
        width: f32,
    },
    Rectangle {
        origin: Point2D<f32>,
        width: f32,
        height: f32,
        color: String,
        stroke_width: f32,
    },
    Triangle {
        start: Point2D<f32>,
        end: Point2D<f32>,
        color: String,
        width: f32,
    },
    AddText(TextObject),
    MoveText {
        text: String,
        to: Point2D<f32>,
        color: String,
        size: f32,
    },
    Clear,
}
