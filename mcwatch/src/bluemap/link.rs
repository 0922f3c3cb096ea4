use super::client::Position;

/// Fixed camera pose appended after the coordinates: zoom, rotation, tilt,
/// ortho flag, ortho height and projection.
const CAMERA_POSE: &str = "20:-0.78:0.47:0:0:perspective";

/// Build a viewer link centred on `position` in `world`.
///
/// Coordinates are rounded half to even, so `-20.5` becomes `-20`.
pub fn deep_link(base_url: &str, world: &str, position: Position) -> String {
    format!(
        "{}/#{}:{}:{}:{}:{}",
        base_url.trim_end_matches('/'),
        world,
        position.x.round_ties_even() as i64,
        position.y.round_ties_even() as i64,
        position.z.round_ties_even() as i64,
        CAMERA_POSE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_link_format() {
        let position = Position {
            x: 100.4,
            y: 64.6,
            z: -20.5,
        };
        assert_eq!(
            deep_link("https://map.example.com/", "world", position),
            "https://map.example.com/#world:100:65:-20:20:-0.78:0.47:0:0:perspective"
        );
    }

    #[test]
    fn test_deep_link_rounds_halves_to_even() {
        let position = Position {
            x: 0.5,
            y: 64.5,
            z: 1.5,
        };
        assert_eq!(
            deep_link("https://map.example.com", "world", position),
            "https://map.example.com/#world:0:64:2:20:-0.78:0.47:0:0:perspective"
        );
    }
}
