use std::cmp::Ordering;

use shared::domain::{FilterSet, Record, SortDirection, SortKey, SortSpec};

/// Derives the visible row set from the full dataset and the active
/// control state. Pure and deterministic: identical inputs always
/// produce the same membership and ordering. Every call re-filters and
/// re-sorts from scratch; dataset sizes are bounded by pagination, so
/// nothing is memoized.
pub fn derive(dataset: &[Record], filters: &FilterSet, sorts: &SortSpec) -> Vec<Record> {
    let mut view: Vec<Record> = dataset.to_vec();

    // One stable pass per active sort key, in fixed key order. Each
    // pass compares only its own key, so when several sorts are active
    // the last pass dominates and earlier passes merely break its
    // ties. Single-key sorts are the supported case; the sequential
    // behavior for multiple keys is kept as-is so shared links that
    // encode several sorts keep rendering the same order they always
    // did.
    for (key, direction) in sorts.iter() {
        view.sort_by(|a, b| compare_by(a, b, key, direction));
    }

    let active: Vec<(&str, String)> = filters
        .iter()
        .map(|(key, pattern)| (key.attr_name(), pattern.to_lowercase()))
        .collect();
    if !active.is_empty() {
        view.retain(|record| {
            active.iter().all(|(attr, pattern)| {
                // Records missing the attribute, or carrying something
                // that is not text, never match; one odd record must
                // not sink the whole derivation.
                record
                    .text_attr(attr)
                    .map(|value| value.to_lowercase().contains(pattern.as_str()))
                    .unwrap_or(false)
            })
        });
    }

    view
}

fn compare_by(a: &Record, b: &Record, key: SortKey, direction: SortDirection) -> Ordering {
    let attr = key.attr_name();
    // Absent attributes order before present ones when ascending.
    let ordering = a.text_attr(attr).cmp(&b.text_attr(attr));
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::FilterKey;

    fn sample_records() -> Vec<Record> {
        vec![
            Record::new(1).with_text("name", "Ali"),
            Record::new(2).with_text("name", "Sara"),
            Record::new(3).with_text("name", "Ala"),
        ]
    }

    fn ids(view: &[Record]) -> Vec<i64> {
        view.iter().map(|r| r.id.0).collect()
    }

    #[test]
    fn filters_by_case_insensitive_substring_preserving_dataset_order() {
        let mut filters = FilterSet::default();
        filters.set(FilterKey::Name, Some("al".to_string()));

        let view = derive(&sample_records(), &filters, &SortSpec::default());
        assert_eq!(ids(&view), vec![1, 3]);
    }

    #[test]
    fn sorts_ascending_by_lexical_comparison() {
        let mut sorts = SortSpec::default();
        sorts.set(SortKey::Name, Some(SortDirection::Ascending));

        let view = derive(&sample_records(), &FilterSet::default(), &sorts);
        assert_eq!(ids(&view), vec![3, 1, 2]);
    }

    #[test]
    fn sorts_descending_reverses_the_ascending_order() {
        let mut sorts = SortSpec::default();
        sorts.set(SortKey::Name, Some(SortDirection::Descending));

        let view = derive(&sample_records(), &FilterSet::default(), &sorts);
        assert_eq!(ids(&view), vec![2, 1, 3]);
    }

    #[test]
    fn multiple_filters_combine_with_and() {
        let dataset = vec![
            Record::new(1).with_text("name", "Ali").with_text("field", "price"),
            Record::new(2).with_text("name", "Ala").with_text("field", "title"),
            Record::new(3).with_text("name", "Sara").with_text("field", "price"),
        ];
        let mut filters = FilterSet::default();
        filters.set(FilterKey::Name, Some("al".to_string()));
        filters.set(FilterKey::Field, Some("pri".to_string()));

        let view = derive(&dataset, &filters, &SortSpec::default());
        assert_eq!(ids(&view), vec![1]);
    }

    #[test]
    fn records_missing_the_filtered_attribute_are_excluded() {
        let dataset = vec![
            Record::new(1).with_text("name", "Ali"),
            Record::new(2),
        ];
        let mut filters = FilterSet::default();
        filters.set(FilterKey::Name, Some("a".to_string()));

        let view = derive(&dataset, &filters, &SortSpec::default());
        assert_eq!(ids(&view), vec![1]);
    }

    #[test]
    fn non_text_attribute_values_never_match() {
        let mut numeric = Record::new(2);
        numeric
            .attrs
            .insert("name".to_string(), serde_json::json!(42));
        let dataset = vec![Record::new(1).with_text("name", "Ali"), numeric];

        let mut filters = FilterSet::default();
        filters.set(FilterKey::Name, Some("4".to_string()));

        let view = derive(&dataset, &filters, &SortSpec::default());
        assert!(view.is_empty());
    }

    #[test]
    fn filtering_an_already_filtered_view_changes_nothing() {
        let mut filters = FilterSet::default();
        filters.set(FilterKey::Name, Some("al".to_string()));
        let mut sorts = SortSpec::default();
        sorts.set(SortKey::Name, Some(SortDirection::Ascending));

        let once = derive(&sample_records(), &filters, &sorts);
        let twice = derive(&once, &filters, &sorts);
        assert_eq!(once, twice);
    }

    #[test]
    fn repeated_derivation_is_deterministic() {
        let dataset = vec![
            Record::new(1).with_text("name", "Ali").with_text("date", "2024-01-02"),
            Record::new(2).with_text("name", "Ali").with_text("date", "2024-01-01"),
            Record::new(3).with_text("name", "Ala").with_text("date", "2024-01-03"),
        ];
        let mut sorts = SortSpec::default();
        sorts.set(SortKey::Name, Some(SortDirection::Ascending));

        let first = derive(&dataset, &FilterSet::default(), &sorts);
        for _ in 0..3 {
            assert_eq!(derive(&dataset, &FilterSet::default(), &sorts), first);
        }
    }

    #[test]
    fn simultaneous_sorts_apply_as_sequential_passes() {
        // Two active sorts: the later pass (date) dominates, with the
        // earlier name pass only breaking its ties. This documents the
        // long-standing sequential behavior rather than a true
        // composite sort.
        let dataset = vec![
            Record::new(1).with_text("name", "B").with_text("date", "2024-01-02"),
            Record::new(2).with_text("name", "A").with_text("date", "2024-01-02"),
            Record::new(3).with_text("name", "C").with_text("date", "2024-01-01"),
        ];
        let mut sorts = SortSpec::default();
        sorts.set(SortKey::Name, Some(SortDirection::Ascending));
        sorts.set(SortKey::Date, Some(SortDirection::Ascending));

        let view = derive(&dataset, &FilterSet::default(), &sorts);
        assert_eq!(ids(&view), vec![3, 2, 1]);
    }

    #[test]
    fn records_without_the_sort_attribute_order_first_ascending() {
        let dataset = vec![
            Record::new(1).with_text("name", "Ali"),
            Record::new(2),
        ];
        let mut sorts = SortSpec::default();
        sorts.set(SortKey::Name, Some(SortDirection::Ascending));

        let view = derive(&dataset, &FilterSet::default(), &sorts);
        assert_eq!(ids(&view), vec![2, 1]);
    }
}
