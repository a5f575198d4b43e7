// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_frameprep::{
    buffer::Rect,
    geometry::{GeometryPlanner, PlannerConfig},
    Error,
};
use std::error::Error as StdError;

const SOURCES: [u32; 9] = [2, 3, 17, 320, 480, 641, 800, 1080, 1920];
const TARGETS: [u32; 5] = [224, 320, 416, 640, 1280];

#[test]
fn test_letterbox_800x600_to_640x640() -> Result<(), Box<dyn StdError>> {
    let plan = GeometryPlanner::default().plan(800, 600, 640, 640)?;
    assert_eq!(plan.scale, 0.8);
    assert_eq!(plan.x_pad, 0);
    assert_eq!(plan.y_pad, 80);
    assert_eq!(plan.src_crop, Rect::new(0, 0, 800, 600));
    assert_eq!(plan.dst_place, Rect::new(0, 80, 640, 480));
    Ok(())
}

#[test]
fn test_letterbox_1080p() -> Result<(), Box<dyn StdError>> {
    let plan = GeometryPlanner::default().plan(1920, 1080, 640, 640)?;
    assert_eq!(plan.x_pad, 0);
    assert_eq!(plan.dst_place.width, 640);
    assert_eq!(plan.dst_place.height, 360);
    assert_eq!(plan.y_pad, 140);

    // Portrait sources pad horizontally on a width quantum.
    let plan = GeometryPlanner::default().plan(1080, 1920, 640, 640)?;
    assert_eq!(plan.y_pad, 0);
    assert_eq!(plan.dst_place.height, 640);
    assert_eq!(plan.dst_place.width % 4, 0);
    assert_eq!(plan.x_pad % 2, 0);
    Ok(())
}

#[test]
fn test_same_aspect_has_no_padding() -> Result<(), Box<dyn StdError>> {
    let plan = GeometryPlanner::default().plan(1280, 720, 640, 360)?;
    assert_eq!((plan.x_pad, plan.y_pad), (0, 0));
    assert_eq!(plan.dst_place, Rect::full(640, 360));
    Ok(())
}

#[test]
fn test_same_aspect_keeps_unaligned_width() -> Result<(), Box<dyn StdError>> {
    let plan = GeometryPlanner::default().plan(200, 100, 50, 25)?;
    assert_eq!(plan.scale, 0.25);
    assert_eq!((plan.x_pad, plan.y_pad), (0, 0));
    assert_eq!(plan.dst_place, Rect::full(50, 25));

    let plan = GeometryPlanner::default().plan(300, 100, 75, 25)?;
    assert_eq!(plan.dst_place, Rect::full(75, 25));
    Ok(())
}

#[test]
fn test_placement_within_destination() {
    let planners = [
        GeometryPlanner::default(),
        GeometryPlanner::new(PlannerConfig {
            allow_slight_change: false,
            ..PlannerConfig::default()
        }),
    ];
    for planner in planners {
        for sw in SOURCES {
            for sh in SOURCES {
                for dw in TARGETS {
                    for dh in TARGETS {
                        let plan = match planner.plan(sw, sh, dw, dh) {
                            Ok(plan) => plan,
                            Err(Error::InvalidGeometry { .. }) => continue,
                            Err(e) => panic!("{sw}x{sh} -> {dw}x{dh}: {e}"),
                        };
                        let place = plan.dst_place;
                        let canvas = Rect::full(dw, dh);
                        assert!(
                            canvas.contains(&place),
                            "{sw}x{sh} -> {dw}x{dh}: {place}"
                        );
                        assert!(!place.is_empty());
                        assert!(
                            plan.x_pad == 0 || plan.y_pad == 0,
                            "{sw}x{sh} -> {dw}x{dh}: pads {}x{}",
                            plan.x_pad,
                            plan.y_pad
                        );
                        assert_eq!(place.x, plan.x_pad as i32);
                        assert_eq!(place.y, plan.y_pad as i32);
                        assert!(place.width == dw as i32 || place.height == dh as i32);
                    }
                }
            }
        }
    }
}

#[test]
fn test_deterministic() -> Result<(), Box<dyn StdError>> {
    let planner = GeometryPlanner::default();
    assert_eq!(planner.plan(1437, 913, 416, 416)?, planner.plan(1437, 913, 416, 416)?);
    Ok(())
}

#[test]
fn test_degenerate_input() {
    let planner = GeometryPlanner::default();
    for (sw, sh, dw, dh) in [(0, 600, 640, 640), (800, 0, 640, 640), (800, 600, 0, 640)] {
        assert!(matches!(
            planner.plan(sw, sh, dw, dh),
            Err(Error::InvalidGeometry { .. })
        ));
    }
    // A sliver that scales to nothing cannot be placed.
    assert!(matches!(
        planner.plan(10000, 1, 640, 640),
        Err(Error::InvalidGeometry { .. })
    ));
}

#[test]
fn test_crop_region() -> Result<(), Box<dyn StdError>> {
    let planner = GeometryPlanner::default();
    let plan = planner.plan_region(1920, 1080, Rect::new(480, 0, 960, 1080), 640, 640)?;
    assert_eq!(plan.src_crop, Rect::new(480, 0, 960, 1080));
    assert_eq!(plan.y_pad, 0);
    assert_eq!(plan.dst_place.height, 640);

    // Out of bounds crops are clamped before planning.
    let plan = planner.plan_region(800, 600, Rect::new(-100, -100, 500, 500), 640, 640)?;
    assert_eq!(plan.src_crop, Rect::new(0, 0, 400, 400));
    assert_eq!(plan.dst_place, Rect::full(640, 640));

    assert!(matches!(
        planner.plan_region(800, 600, Rect::new(900, 0, 10, 10), 640, 640),
        Err(Error::InvalidGeometry { .. })
    ));
    Ok(())
}

#[test]
fn test_box_mapping() -> Result<(), Box<dyn StdError>> {
    let plan = GeometryPlanner::default().plan(800, 600, 640, 640)?;
    assert_eq!(plan.to_source(plan.dst_place), Rect::new(0, 0, 800, 600));
    assert_eq!(
        plan.to_destination(Rect::new(100, 100, 200, 100)),
        Rect::new(80, 160, 160, 80)
    );

    // Boxes reaching into the padding are clamped to the image.
    assert_eq!(
        plan.to_source(Rect::new(-20, 0, 100, 100)),
        Rect::new(0, 0, 100, 25)
    );
    Ok(())
}
