use detpost::{ConfLayout, ConfidenceMatrix, DetectConfig, Detector, LocOffset, PriorBox};

/// Disjoint unit priors centered at x = 10 * i + 0.5.
fn unit_priors(n: usize) -> Vec<PriorBox> {
    (0..n)
        .map(|i| PriorBox {
            cx: 10.0 * i as f32 + 0.5,
            cy: 0.5,
            w: 1.0,
            h: 1.0,
        })
        .collect()
}

fn config() -> DetectConfig {
    DetectConfig {
        num_classes: 3,
        background_label: 0,
        keep_top_k: 2,
        conf_thresh: 0.1,
        nms_threshold: 0.5,
        nms_top_k: None,
        ..DetectConfig::default()
    }
}

/// Prior-major confidence rows `[bg, class1, class2]` for four priors.
fn image_one_conf() -> Vec<f32> {
    vec![
        0.0, 0.9, 0.0, // prior 0
        0.0, 0.95, 0.0, // prior 1
        0.0, 0.0, 0.8, // prior 2
        0.0, 0.0, 0.0, // prior 3
    ]
}

fn image_two_conf() -> Vec<f32> {
    vec![
        0.99, 0.0, 0.0, // prior 0: background only, must not be emitted
        0.0, 0.0, 0.0, // prior 1
        0.0, 0.0, 0.0, // prior 2
        0.0, 0.0, 0.6, // prior 3
    ]
}

#[test]
fn merges_classes_by_global_score_rank() {
    let detector = Detector::new(unit_priors(4), config()).unwrap();
    let loc = vec![0.0f32; 16];

    let out = detector.run(&loc, &image_one_conf()).unwrap();
    assert_eq!(out.batch(), 1);
    assert_eq!(out.num_detections(0), Some(2));

    // Class 1 owns both kept slots; class 2's 0.8 is truncated away.
    let first = out.row(0, 0).unwrap();
    assert_eq!(&first[..3], &[1.0, 1.0, 0.95]);
    assert_eq!(&first[3..], &[10.0, 0.0, 11.0, 1.0]);

    let second = out.row(0, 1).unwrap();
    assert_eq!(&second[..3], &[1.0, 1.0, 0.9]);
    assert_eq!(&second[3..], &[0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn every_image_in_the_batch_is_processed() {
    let detector = Detector::new(unit_priors(4), config()).unwrap();
    let loc = vec![0.0f32; 32];
    let conf: Vec<f32> = image_one_conf()
        .into_iter()
        .chain(image_two_conf())
        .collect();

    let out = detector.run(&loc, &conf).unwrap();
    assert_eq!(out.batch(), 2);
    assert_eq!(out.num_detections(0), Some(2));
    assert_eq!(out.num_detections(1), Some(1));

    // Image ids are 1-based.
    assert_eq!(out.row(0, 0).unwrap()[0], 1.0);
    let row = out.row(1, 0).unwrap();
    assert_eq!(&row[..3], &[2.0, 2.0, 0.6]);
    assert_eq!(&row[3..], &[30.0, 0.0, 31.0, 1.0]);
}

#[test]
fn unused_slots_stay_zero() {
    let detector = Detector::new(unit_priors(4), config()).unwrap();
    let loc = vec![0.0f32; 32];
    let conf: Vec<f32> = image_one_conf()
        .into_iter()
        .chain(image_two_conf())
        .collect();

    let out = detector.run(&loc, &conf).unwrap();
    assert_eq!(out.as_slice().len(), 2 * 2 * 7);
    assert!(out.row(1, 1).unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn background_class_is_never_emitted() {
    let detector = Detector::new(unit_priors(4), config()).unwrap();
    let loc = vec![0.0f32; 16];

    let out = detector.run(&loc, &image_two_conf()).unwrap();
    assert_eq!(out.num_detections(0), Some(1));
    // Only the class-2 hit survives; the 0.99 background score is ignored.
    assert_eq!(out.row(0, 0).unwrap()[1], 2.0);
}

#[test]
fn confidence_prefilter_drops_low_scores() {
    let cfg = DetectConfig {
        conf_thresh: 0.7,
        ..config()
    };
    let detector = Detector::new(unit_priors(4), cfg).unwrap();
    let loc = vec![0.0f32; 16];

    // 0.6 and 0.65 sit below the 0.7 floor even though the boxes are disjoint.
    let conf = vec![
        0.0, 0.9, 0.0, //
        0.0, 0.6, 0.0, //
        0.0, 0.0, 0.65, //
        0.0, 0.0, 0.75, //
    ];
    let out = detector.run(&loc, &conf).unwrap();
    assert_eq!(out.num_detections(0), Some(2));
    assert_eq!(out.row(0, 0).unwrap()[2], 0.9);
    assert_eq!(out.row(0, 1).unwrap()[2], 0.75);
}

#[test]
fn per_class_cap_limits_survivors_before_merging() {
    let cfg = DetectConfig {
        nms_top_k: Some(1),
        keep_top_k: 4,
        ..config()
    };
    let detector = Detector::new(unit_priors(4), cfg).unwrap();
    let loc = vec![0.0f32; 16];

    let out = detector.run(&loc, &image_one_conf()).unwrap();
    // One survivor per class: 0.95 from class 1, 0.8 from class 2.
    assert_eq!(out.num_detections(0), Some(2));
    assert_eq!(out.row(0, 0).unwrap()[2], 0.95);
    assert_eq!(out.row(0, 1).unwrap()[2], 0.8);
}

#[test]
fn class_major_layout_matches_prior_major() {
    let prior_major = Detector::new(unit_priors(4), config()).unwrap();
    let class_major = Detector::new(
        unit_priors(4),
        DetectConfig {
            conf_layout: ConfLayout::ClassMajor,
            ..config()
        },
    )
    .unwrap();

    let loc = vec![0.0f32; 16];
    let conf_pm = image_one_conf();
    // Transposed by hand: [3 classes, 4 priors].
    let conf_cm = vec![
        0.0, 0.0, 0.0, 0.0, // background
        0.9, 0.95, 0.0, 0.0, // class 1
        0.0, 0.0, 0.8, 0.0, // class 2
    ];

    let a = prior_major.run(&loc, &conf_pm).unwrap();
    let b = class_major.run(&loc, &conf_cm).unwrap();
    assert_eq!(a.as_slice(), b.as_slice());
}

#[test]
fn detect_image_agrees_with_run() {
    let detector = Detector::new(unit_priors(4), config()).unwrap();
    let offsets = vec![
        LocOffset {
            dx: 0.0,
            dy: 0.0,
            dw: 0.0,
            dh: 0.0,
        };
        4
    ];
    let scores = ConfidenceMatrix::from_prior_major(&image_one_conf(), 3, 4).unwrap();

    let detections = detector.detect_image(&offsets, &scores, 1).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].image_id, 1);
    assert_eq!(detections[0].label, 1);
    assert_eq!(detections[0].score, 0.95);
    assert_eq!(detections[1].score, 0.9);
}

#[test]
fn overlapping_boxes_are_suppressed_end_to_end() {
    // Two priors on the same spot plus one far away.
    let priors = vec![
        PriorBox {
            cx: 0.5,
            cy: 0.5,
            w: 1.0,
            h: 1.0,
        },
        PriorBox {
            cx: 0.5,
            cy: 0.5,
            w: 1.0,
            h: 1.0,
        },
        PriorBox {
            cx: 20.5,
            cy: 0.5,
            w: 1.0,
            h: 1.0,
        },
    ];
    let detector = Detector::new(priors, config()).unwrap();
    let loc = vec![0.0f32; 12];
    let conf = vec![
        0.0, 0.8, 0.0, //
        0.0, 0.9, 0.0, //
        0.0, 0.7, 0.0, //
    ];

    let out = detector.run(&loc, &conf).unwrap();
    // Prior 1 beats its duplicate prior 0; prior 2 is disjoint and survives.
    assert_eq!(out.num_detections(0), Some(2));
    assert_eq!(out.row(0, 0).unwrap()[2], 0.9);
    assert_eq!(out.row(0, 1).unwrap()[2], 0.7);
}

#[test]
fn identical_batches_produce_identical_buffers() {
    let detector = Detector::new(unit_priors(4), config()).unwrap();
    let loc = vec![0.0f32; 32];
    let conf: Vec<f32> = image_one_conf()
        .into_iter()
        .chain(image_two_conf())
        .collect();

    let first = detector.run(&loc, &conf).unwrap();
    let second = detector.run(&loc, &conf).unwrap();
    assert_eq!(first.as_slice(), second.as_slice());
}
