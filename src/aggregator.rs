// Downsampling math: batch average of one bucket, and running-average merge into an
// existing bucket record. Pure; storage lives in rollup.

use std::collections::BTreeMap;

use crate::models::{EntityMap, MetricSample, TimeSeriesPoint};

/// Averages a bucket of points into one. Entities are averaged only over the points that
/// contain them. Returns None for an empty bucket.
///
/// The output carries the timestamp of the chronologically last input and
/// `aggregationType = "average"` with a count of 1; the caller stamps the bucket start.
pub fn combine(points: &[TimeSeriesPoint], resolution: &str) -> Option<TimeSeriesPoint> {
    let mut ordered: Vec<&TimeSeriesPoint> = points.iter().collect();
    ordered.sort_by_key(|p| p.timestamp);
    let last = ordered.last()?;

    let mut by_id: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();
    for p in &ordered {
        for (id, sample) in &p.entities {
            by_id.entry(id.as_str()).or_default().push(sample);
        }
    }

    let entities: EntityMap = by_id
        .into_iter()
        .map(|(id, samples)| (id.to_string(), average_samples(&samples)))
        .collect();

    Some(TimeSeriesPoint::average(
        last.timestamp,
        resolution,
        entities,
        1,
    ))
}

/// Samples must be in chronological order; name and limit come from the newest.
fn average_samples(samples: &[&MetricSample]) -> MetricSample {
    let newest = samples[samples.len() - 1];
    let mean = |f: fn(&MetricSample) -> f64| mean_f64(samples.iter().map(|s| f(s)));

    MetricSample {
        name: newest.name.clone(),
        cpu_percent: mean(|s| s.cpu_percent),
        memory_usage: mean(|s| s.memory_usage),
        memory_limit: newest.memory_limit,
        memory_percent: mean(|s| s.memory_percent),
        net_io_in: mean(|s| s.net_io_in),
        net_io_out: mean(|s| s.net_io_out),
        block_io_in: mean(|s| s.block_io_in),
        block_io_out: mean(|s| s.block_io_out),
        pids: mean(|s| s.pids as f64).round() as u64,
    }
}

/// Folds `incoming` into `existing` as one more observation:
/// `(old * old_count + new) / (old_count + 1)` per field.
///
/// `incoming` is weighted as a single observation even when it is itself an average of
/// many samples, so a bucket that absorbs several rollups drifts from the true mean.
pub fn merge_incremental(
    existing: &EntityMap,
    incoming: &EntityMap,
    old_count: u32,
) -> (EntityMap, u32) {
    let old_count = old_count.max(1);
    let new_count = old_count.saturating_add(1);
    let old_w = old_count as f64;
    let new_w = new_count as f64;

    let mut merged = EntityMap::new();
    for (id, old) in existing {
        let sample = match incoming.get(id) {
            Some(new) => {
                let blend = |o: f64, n: f64| (o * old_w + n) / new_w;
                MetricSample {
                    name: new.name.clone(),
                    cpu_percent: blend(old.cpu_percent, new.cpu_percent),
                    memory_usage: blend(old.memory_usage, new.memory_usage),
                    memory_limit: new.memory_limit,
                    memory_percent: blend(old.memory_percent, new.memory_percent),
                    net_io_in: blend(old.net_io_in, new.net_io_in),
                    net_io_out: blend(old.net_io_out, new.net_io_out),
                    block_io_in: blend(old.block_io_in, new.block_io_in),
                    block_io_out: blend(old.block_io_out, new.block_io_out),
                    pids: blend(old.pids as f64, new.pids as f64).round() as u64,
                }
            }
            None => old.clone(),
        };
        merged.insert(id.clone(), sample);
    }
    for (id, new) in incoming {
        merged.entry(id.clone()).or_insert_with(|| new.clone());
    }

    (merged, new_count)
}

fn mean_f64(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Aggregation;

    fn sample(name: &str, cpu: f64, limit: f64, pids: u64) -> MetricSample {
        MetricSample {
            cpu_percent: cpu,
            memory_usage: cpu * 10.0,
            memory_limit: limit,
            pids,
            ..MetricSample::named(name)
        }
    }

    fn point(ts: i64, entities: &[(&str, MetricSample)]) -> TimeSeriesPoint {
        TimeSeriesPoint::raw(
            ts,
            "10s",
            entities
                .iter()
                .map(|(id, s)| (id.to_string(), s.clone()))
                .collect(),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn combine_empty_is_none() {
        assert!(combine(&[], "5m").is_none());
    }

    #[test]
    fn combine_averages_fields_and_takes_last_timestamp() {
        let points = vec![
            point(1_000, &[("web", sample("web", 10.0, 512.0, 3))]),
            point(2_000, &[("web", sample("web", 20.0, 512.0, 4))]),
            point(3_000, &[("web", sample("web", 30.0, 1024.0, 4))]),
        ];
        let out = combine(&points, "5m").unwrap();
        assert_eq!(out.timestamp, 3_000);
        assert_eq!(out.metadata.resolution, "5m");
        assert_eq!(out.metadata.aggregation, Aggregation::Average { count: 1 });
        let web = &out.entities["web"];
        assert!(close(web.cpu_percent, 20.0));
        assert!(close(web.memory_usage, 200.0));
        assert_eq!(web.memory_limit, 1024.0);
        assert_eq!(web.pids, 4); // 3.67 rounds to 4
    }

    #[test]
    fn combine_absent_entity_is_not_zero() {
        let points = vec![
            point(
                1_000,
                &[
                    ("web", sample("web", 10.0, 1.0, 1)),
                    ("db", sample("db", 50.0, 1.0, 1)),
                ],
            ),
            point(2_000, &[("web", sample("web", 30.0, 1.0, 1))]),
        ];
        let out = combine(&points, "5m").unwrap();
        assert!(close(out.entities["web"].cpu_percent, 20.0));
        assert!(close(out.entities["db"].cpu_percent, 50.0));
    }

    #[test]
    fn combine_unsorted_input_uses_newest_limit() {
        let points = vec![
            point(3_000, &[("web", sample("web", 30.0, 2048.0, 1))]),
            point(1_000, &[("web", sample("web", 10.0, 512.0, 1))]),
        ];
        let out = combine(&points, "5m").unwrap();
        assert_eq!(out.timestamp, 3_000);
        assert_eq!(out.entities["web"].memory_limit, 2048.0);
    }

    #[test]
    fn merge_incremental_running_mean() {
        let existing: EntityMap = [("web".to_string(), sample("web", 10.0, 512.0, 2))].into();
        let incoming: EntityMap = [("web".to_string(), sample("web", 40.0, 1024.0, 6))].into();
        let (merged, count) = merge_incremental(&existing, &incoming, 2);
        assert_eq!(count, 3);
        assert!(close(merged["web"].cpu_percent, 20.0));
        assert_eq!(merged["web"].memory_limit, 1024.0);
        assert_eq!(merged["web"].pids, 3); // (2*2+6)/3 = 3.33
    }

    #[test]
    fn merge_incremental_one_sided_entities_carried() {
        let existing: EntityMap = [("old".to_string(), sample("old", 5.0, 1.0, 1))].into();
        let incoming: EntityMap = [("new".to_string(), sample("new", 7.0, 1.0, 1))].into();
        let (merged, count) = merge_incremental(&existing, &incoming, 4);
        assert_eq!(count, 5);
        assert_eq!(merged["old"], existing["old"]);
        assert_eq!(merged["new"], incoming["new"]);
    }

    #[test]
    fn sequential_merge_matches_batch_combine() {
        let a = point(1_000, &[("web", sample("web", 10.0, 1.0, 1))]);
        let b = point(2_000, &[("web", sample("web", 25.0, 1.0, 1))]);
        let c = point(3_000, &[("web", sample("web", 55.0, 1.0, 1))]);

        let (ab, n) = merge_incremental(&a.entities, &b.entities, 1);
        let (abc, n) = merge_incremental(&ab, &c.entities, n);
        assert_eq!(n, 3);

        let batch = combine(&[a, b, c], "1m").unwrap();
        let (s, b) = (&abc["web"], &batch.entities["web"]);
        assert!(close(s.cpu_percent, b.cpu_percent));
        assert!(close(s.memory_usage, b.memory_usage));
        assert!(close(s.net_io_in, b.net_io_in));
    }

    #[test]
    fn merge_incremental_count_saturates() {
        let existing: EntityMap = [("web".to_string(), sample("web", 10.0, 1.0, 1))].into();
        let (_, count) = merge_incremental(&existing, &existing, u32::MAX);
        assert_eq!(count, u32::MAX);
    }
}
