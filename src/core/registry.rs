use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::core::poster::PosterType;

pub const DEFAULT_ECHARTS_URL: &str = "https://cdn.jsdelivr.net/npm/echarts@5.5.0/dist/echarts.min.js";

pub const DEFAULT_PALETTE: [&str; 8] = [
    "#1C5C3D", "#D97706", "#2563EB", "#6B7280", "#10B981", "#8C3A3A", "#7C3AED", "#DB2777",
];

pub struct FamilyTemplate {
    pub wait_selector: String,
    pub init_script: String,
}

/// Page bootstrap per poster family. `{option}` is replaced with the
/// ECharts option JSON, `{images}` with the bar label image list.
pub static FAMILY_REGISTRY: Lazy<HashMap<PosterType, FamilyTemplate>> = Lazy::new(|| {
    let mut registry = HashMap::new();

    registry.insert(
        PosterType::Pie,
        FamilyTemplate {
            wait_selector: "#chart".to_string(),
            init_script: r#"
                const chart = echarts.init(document.getElementById('chart'), null, { renderer: 'canvas' });
                chart.setOption({option});
                window.renderReady = true;
            "#
            .to_string(),
        },
    );

    registry.insert(
        PosterType::Bar,
        FamilyTemplate {
            wait_selector: "#chart".to_string(),
            init_script: r#"
                const option = {option};
                const images = {images};
                const axis = option.yAxis.type === 'category' ? option.yAxis : option.xAxis;
                axis.axisLabel = Object.assign(axis.axisLabel || {}, {
                    formatter: (value, idx) => images[idx] ? '{img' + idx + '|} ' + value : value
                });
                const chart = echarts.init(document.getElementById('chart'), null, { renderer: 'canvas' });
                chart.setOption(option);
                window.renderReady = true;
            "#
            .to_string(),
        },
    );

    registry.insert(
        PosterType::Dual,
        FamilyTemplate {
            wait_selector: "#chart".to_string(),
            init_script: r#"
                const chart = echarts.init(document.getElementById('chart'), null, { renderer: 'canvas' });
                chart.setOption({option});
                window.renderReady = true;
            "#
            .to_string(),
        },
    );

    registry
});
