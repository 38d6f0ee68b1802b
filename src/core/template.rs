use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde_json::{Value as JsonValue, json};

use crate::core::dispatcher::{BarParams, CommonParams, DualParams, HighlightRecord, PieParams, RenderJob};
use crate::core::poster::{Orientation, SeriesType, TimeRange};
use crate::core::registry::{DEFAULT_PALETTE, FAMILY_REGISTRY};

/// Images already inlined as data URIs, plus page geometry.
#[derive(Debug, Clone, Default)]
pub struct PageAssets {
    pub background: Option<String>,
    pub center_image: Option<String>,
    pub label_images: Vec<Option<String>>,
    pub footer_date: String,
    pub width: u32,
    pub height: u32,
    pub echarts_url: String,
}

pub fn generate_html(job: &RenderJob, assets: &PageAssets) -> Result<String> {
    let family = FAMILY_REGISTRY
        .get(&job.poster_type())
        .ok_or_else(|| anyhow!("Unsupported poster type: {}", job.poster_type()))?;

    let option = match job {
        RenderJob::Pie(p) => pie_option(p, assets),
        RenderJob::Bar(p) => bar_option(p, assets),
        RenderJob::Dual(p) => dual_option(p),
    };

    let images: Vec<bool> = assets.label_images.iter().map(Option::is_some).collect();
    let init_script = family
        .init_script
        .replace("{images}", &script_json(&json!(images))?)
        .replace("{option}", &script_json(&option)?);

    let common = job.common();
    let background_css = assets
        .background
        .as_ref()
        .map(|uri| format!("background-image: url('{}'); background-size: cover;", uri))
        .unwrap_or_default();
    let center_img = match (&assets.center_image, job) {
        // The pie centre sits inside the donut hole.
        (Some(uri), RenderJob::Pie(_)) => format!(r#"<img id="center-image" class="in-chart" src="{}">"#, uri),
        (Some(uri), _) => format!(r#"<img id="center-image" src="{}">"#, uri),
        (None, _) => String::new(),
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}
        body {{
            background: white;
            overflow: hidden;
            font-family: 'Helvetica Neue', Arial, sans-serif;
        }}
        #poster {{
            position: relative;
            width: {width}px;
            height: {height}px;
            {background_css}
        }}
        #header {{
            position: absolute;
            top: 6%;
            left: 7%;
            right: 7%;
        }}
        #header h1 {{
            font-size: {title_px}px;
            color: #111827;
        }}
        #header h2 {{
            margin-top: 12px;
            font-size: {subtitle_px}px;
            font-weight: 400;
            color: #4B5563;
        }}
        #chart {{
            position: absolute;
            top: 22%;
            left: 5%;
            width: 90%;
            height: 62%;
        }}
        #center-image {{
            position: absolute;
            top: 7%;
            right: 7%;
            width: 96px;
            height: 96px;
            object-fit: contain;
        }}
        #center-image.in-chart {{
            top: calc(22% + 31% - 60px);
            left: calc(50% - 60px);
            width: 120px;
            height: 120px;
            border-radius: 50%;
        }}
        #footer {{
            position: absolute;
            bottom: 4%;
            left: 7%;
            right: 7%;
            display: flex;
            justify-content: space-between;
            font-size: {footer_px}px;
            color: #6B7280;
        }}
    </style>
</head>
<body>
    <div id="poster">
        <div id="header">
            <h1>{title}</h1>
            <h2>{subtitle}</h2>
        </div>
        <div id="chart"></div>
        {center_img}
        <div id="footer">
            <span id="note">{note}</span>
            <span id="date">{date}</span>
        </div>
    </div>

    <script src="{echarts_url}"></script>

    <script>
        window.renderReady = false;
        window.renderError = null;

        window.addEventListener('DOMContentLoaded', () => {{
            try {{
                {init_script}
            }} catch (error) {{
                console.error('Render initialization error:', error);
                window.renderError = error.message;
            }}
        }});
    </script>
</body>
</html>"#,
        title = escape_html(&common.title),
        subtitle = escape_html(&common.subtitle),
        note = escape_html(&common.note_value),
        date = escape_html(&assets.footer_date),
        width = assets.width,
        height = assets.height,
        title_px = assets.width / 22,
        subtitle_px = assets.width / 40,
        footer_px = assets.width / 60,
        background_css = background_css,
        center_img = center_img,
        echarts_url = assets.echarts_url,
        init_script = init_script,
    );

    Ok(html)
}

/// Serializes for inline `<script>` use without closing the tag early.
fn script_json(value: &JsonValue) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn palette(common: &CommonParams, n: usize) -> Vec<String> {
    let given = common.colors_hex.as_deref().unwrap_or_default();
    (0..n)
        .map(|i| {
            given
                .get(i)
                .cloned()
                .unwrap_or_else(|| DEFAULT_PALETTE[i % DEFAULT_PALETTE.len()].to_string())
        })
        .collect()
}

fn pie_option(p: &PieParams, assets: &PageAssets) -> JsonValue {
    let inner = if assets.center_image.is_some() { "45%" } else { "0%" };
    let data: Vec<JsonValue> = p
        .labels
        .iter()
        .zip(&p.values)
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    json!({
        "animation": false,
        "color": palette(&p.common, p.values.len()),
        "legend": { "bottom": 0, "textStyle": { "fontSize": 22 } },
        "series": [{
            "type": "pie",
            "radius": [inner, "72%"],
            "center": ["50%", "50%"],
            "label": { "formatter": "{b}\n{d}%", "fontSize": 22 },
            "data": data,
        }],
    })
}

fn bar_option(p: &BarParams, assets: &PageAssets) -> JsonValue {
    let colors = palette(&p.common, p.values.len());
    let data: Vec<JsonValue> = p
        .values
        .iter()
        .zip(&colors)
        .map(|(value, color)| json!({ "value": value, "itemStyle": { "color": color } }))
        .collect();

    let mut rich = serde_json::Map::new();
    for (idx, uri) in assets.label_images.iter().enumerate() {
        if let Some(uri) = uri {
            rich.insert(
                format!("img{}", idx),
                json!({ "height": 32, "width": 32, "backgroundColor": { "image": uri } }),
            );
        }
    }

    let category = json!({
        "type": "category",
        "data": p.labels,
        "axisLabel": { "fontSize": 20, "rich": rich },
    });
    let value = json!({
        "type": "value",
        "name": p.value_axis_label,
        "nameLocation": "middle",
        "nameGap": 48,
    });

    let (x_axis, y_axis) = match p.orientation {
        Orientation::Horizontal => {
            let mut category = category;
            category["inverse"] = json!(true);
            (value, category)
        }
        Orientation::Vertical => (category, value),
    };

    json!({
        "animation": false,
        "grid": { "containLabel": true, "left": 24, "right": 24 },
        "xAxis": x_axis,
        "yAxis": y_axis,
        "series": [{ "type": "bar", "data": data, "barMaxWidth": 64 }],
    })
}

/// Indices of `x_values` inside the time window ending at the latest date.
/// Non-date axes are never windowed.
pub fn window_indices(x_values: &[String], range: TimeRange) -> Vec<usize> {
    let all = || (0..x_values.len()).collect();
    let Some(days) = range.window_days() else {
        return all();
    };
    let dates: Option<Vec<NaiveDate>> = x_values
        .iter()
        .map(|x| NaiveDate::parse_from_str(x.get(..10).unwrap_or(x), "%Y-%m-%d").ok())
        .collect();
    let Some(dates) = dates else {
        return all();
    };
    let Some(latest) = dates.iter().max().copied() else {
        return all();
    };
    dates
        .iter()
        .enumerate()
        .filter(|(_, d)| (latest - **d).num_days() < days)
        .map(|(i, _)| i)
        .collect()
}

fn pick<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().filter_map(|&i| values.get(i).cloned()).collect()
}

fn series_entry(name: &str, data: Vec<f64>, kind: SeriesType, axis: usize, color: &str) -> JsonValue {
    let chart_type = if kind == SeriesType::Bar { "bar" } else { "line" };
    let mut entry = json!({
        "name": name,
        "type": chart_type,
        "yAxisIndex": axis,
        "data": data,
        "showSymbol": false,
        "itemStyle": { "color": color },
        "lineStyle": { "width": 3 },
    });
    if kind == SeriesType::Area {
        entry["areaStyle"] = json!({ "opacity": 0.25 });
    }
    entry
}

fn value_axis(name: &str, log: bool, include_zero: bool, right: bool) -> JsonValue {
    let axis_type = if log { "log" } else { "value" };
    let position = if right { "right" } else { "left" };
    let scale = !include_zero;
    let split_line = !right;
    json!({
        "type": axis_type,
        "name": name,
        "scale": scale,
        "position": position,
        "splitLine": { "show": split_line },
    })
}

fn dual_option(p: &DualParams) -> JsonValue {
    let kept = window_indices(&p.x_values, p.time_range);
    let x_values = pick(&p.x_values, &kept);
    let colors = palette(&p.common, p.y_series.len());

    let mut series: Vec<JsonValue> = p
        .y_series
        .iter()
        .zip(&colors)
        .map(|((name, values), color)| series_entry(name, pick(values, &kept), p.left_series_type, 0, color))
        .collect();

    let mut y_axes = vec![value_axis(&p.ylabel_left, p.log_left, p.include_zero_left, false)];
    if let Some(right) = &p.right_series {
        let name = if p.ylabel_right.is_empty() { "right" } else { p.ylabel_right.as_str() };
        series.push(series_entry(name, pick(right, &kept), p.right_series_type, 1, &p.right_color_hex));
        y_axes.push(value_axis(&p.ylabel_right, p.log_right, p.include_zero_right, true));
    }

    if let (Some(regions), Some(first)) = (&p.highlight_regions, series.first_mut()) {
        let data: Vec<JsonValue> = regions.iter().filter_map(region_mark).collect();
        first["markArea"] = json!({ "itemStyle": { "color": "rgba(37, 99, 235, 0.12)" }, "data": data });
    }

    if let Some(points) = &p.highlight_points {
        for point in points {
            add_point_mark(&mut series, point, p, &x_values);
        }
    }

    let boundary_gap = p.left_series_type == SeriesType::Bar;
    json!({
        "animation": false,
        "legend": { "top": 0, "textStyle": { "fontSize": 20 } },
        "grid": { "containLabel": true, "left": 24, "right": 24, "top": 64 },
        "xAxis": { "type": "category", "data": x_values, "boundaryGap": boundary_gap },
        "yAxis": y_axes,
        "series": series,
    })
}

fn region_mark(region: &HighlightRecord) -> Option<JsonValue> {
    let start = region.get("start")?.as_str()?;
    let end = region.get("end")?.as_str()?;
    let label = region.get("label").and_then(JsonValue::as_str).unwrap_or("");
    Some(json!([{ "xAxis": start, "name": label }, { "xAxis": end }]))
}

fn add_point_mark(series: &mut [JsonValue], point: &HighlightRecord, p: &DualParams, x_values: &[String]) {
    let Some(x) = point.get("x").and_then(JsonValue::as_str) else {
        return;
    };
    let right = point.get("axis").and_then(JsonValue::as_str) == Some("right");

    let target = if right {
        p.right_series.as_ref().map(|_| p.y_series.len())
    } else {
        match point.get("series") {
            Some(JsonValue::String(key)) => p.y_series.iter().position(|(name, _)| name == key),
            Some(JsonValue::Number(n)) => n.as_u64().map(|i| i as usize).filter(|i| *i < p.y_series.len()),
            _ => Some(0),
        }
    };
    let Some(target) = target else {
        tracing::warn!(event = "highlight_point_skipped", x = %x, reason = "unknown series");
        return;
    };
    let Some(pos) = x_values.iter().position(|v| v == x) else {
        tracing::warn!(event = "highlight_point_skipped", x = %x, reason = "x outside visible range");
        return;
    };
    let Some(entry) = series.get_mut(target) else {
        return;
    };
    let y = entry["data"].get(pos).cloned().unwrap_or(JsonValue::Null);
    let label = point.get("label").and_then(JsonValue::as_str).unwrap_or("");

    if entry.get("markPoint").is_none() {
        entry["markPoint"] = json!({ "symbolSize": 56, "data": [] });
    }
    if let Some(data) = entry["markPoint"]["data"].as_array_mut() {
        data.push(json!({ "coord": [x, y], "value": label }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::defaults::{default_bar, default_dual, default_pie};
    use crate::core::dispatcher::RenderJob;
    use crate::core::poster::{PosterConfig, YSeries};

    fn assets() -> PageAssets {
        PageAssets {
            footer_date: "Jan 02, 2024".to_string(),
            width: 1080,
            height: 1350,
            echarts_url: "https://example.com/echarts.js".to_string(),
            ..PageAssets::default()
        }
    }

    fn job(config: PosterConfig) -> RenderJob {
        RenderJob::from(&config)
    }

    #[test]
    fn pie_page_contains_labels_and_escaped_title() {
        let mut pie = default_pie();
        pie.common.title = "Share <b>& more</b>".to_string();
        let html = generate_html(&job(PosterConfig::Pie(pie)), &assets()).unwrap();
        assert!(html.contains("Share &lt;b&gt;&amp; more&lt;/b&gt;"));
        assert!(html.contains("\"Jupiter\""));
        assert!(html.contains("Jan 02, 2024"));
        assert!(!html.contains("{option}"));
    }

    #[test]
    fn script_json_cannot_close_script_tag() {
        let mut pie = default_pie();
        pie.labels[0] = "</script><script>alert(1)".to_string();
        let html = generate_html(&job(PosterConfig::Pie(pie)), &assets()).unwrap();
        assert!(!html.contains("</script><script>alert(1)"));
    }

    #[test]
    fn bar_orientation_swaps_axes() {
        let bar = default_bar();
        let RenderJob::Bar(mut params) = job(PosterConfig::Bar(bar)) else {
            unreachable!()
        };
        let horizontal = bar_option(&params, &assets());
        assert_eq!(horizontal["yAxis"]["type"], "category");
        assert_eq!(horizontal["xAxis"]["name"], "Volume (USD)");

        params.orientation = Orientation::Vertical;
        let vertical = bar_option(&params, &assets());
        assert_eq!(vertical["xAxis"]["type"], "category");
        assert_eq!(vertical["yAxis"]["type"], "value");
    }

    #[test]
    fn bar_label_images_become_rich_styles() {
        let RenderJob::Bar(params) = job(PosterConfig::Bar(default_bar())) else {
            unreachable!()
        };
        let mut page = assets();
        page.label_images = vec![None, Some("data:image/png;base64,AAAA".to_string())];
        let option = bar_option(&params, &page);
        let rich = &option["yAxis"]["axisLabel"]["rich"];
        assert!(rich.get("img0").is_none());
        assert_eq!(rich["img1"]["backgroundColor"]["image"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn window_keeps_last_days_of_dated_axis() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let dual = default_dual(today);
        assert_eq!(window_indices(&dual.x_values, TimeRange::Week), (23..30).collect::<Vec<_>>());
        assert_eq!(window_indices(&dual.x_values, TimeRange::All).len(), 30);
        assert_eq!(window_indices(&dual.x_values, TimeRange::Year).len(), 30);
    }

    #[test]
    fn window_ignores_numeric_axis() {
        let xs: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(window_indices(&xs, TimeRange::Week).len(), 20);
    }

    #[test]
    fn dual_option_places_right_series_on_second_axis() {
        let dual = default_dual(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let RenderJob::Dual(params) = job(PosterConfig::Dual(dual)) else {
            unreachable!()
        };
        let option = dual_option(&params);
        let series = option["series"].as_array().unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[2]["yAxisIndex"], 1);
        assert_eq!(series[2]["itemStyle"]["color"], "#2563EB");
        assert_eq!(option["yAxis"].as_array().unwrap().len(), 2);
        assert_eq!(option["yAxis"][1]["scale"], true);
    }

    #[test]
    fn dual_highlights_become_marks() {
        let raw = serde_json::json!({
            "poster_type": "dual",
            "title": "T",
            "ylabel_left": "L",
            "left_series_type": "area",
            "x_values": ["a", "b", "c"],
            "y_series": { "s1": [1, 2, 3], "s2": [4, 5, 6] },
            "highlight_regions": [{ "start": "a", "end": "b", "label": "calm" }],
            "highlight_points": [
                { "x": "c", "series": "s2", "label": "top" },
                { "x": "b", "series": "missing" }
            ],
        });
        let RenderJob::Dual(params) = job(PosterConfig::from_value(&raw).unwrap()) else {
            unreachable!()
        };
        let option = dual_option(&params);
        let series = option["series"].as_array().unwrap();
        assert!(series[0]["areaStyle"].is_object());
        assert_eq!(series[0]["markArea"]["data"][0][0]["name"], "calm");
        assert_eq!(series[1]["markPoint"]["data"][0]["coord"], serde_json::json!(["c", 6.0]));
        assert!(series[0].get("markPoint").is_none());
    }

    #[test]
    fn missing_colors_fall_back_to_palette() {
        let mut dual = default_dual(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        dual.colors_hex = None;
        dual.y_series = YSeries(vec![("only".to_string(), vec![1.0; 30])]);
        let RenderJob::Dual(params) = job(PosterConfig::Dual(dual)) else {
            unreachable!()
        };
        let option = dual_option(&params);
        assert_eq!(option["series"][0]["itemStyle"]["color"], DEFAULT_PALETTE[0]);
    }
}
