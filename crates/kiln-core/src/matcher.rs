//! Resource matching for job placement.
//!
//! Worker eligibility and image eligibility are independent; a builder can
//! run on every pair in the cross product of the two eligible sets.

use crate::filter::{CompiledFilter, FilterExpr, Mismatch, explain};
use crate::ids::BuilderName;
use crate::resolver::ResolvedDefinition;
use crate::resource::{CatalogSnapshot, Resource};
use serde::{Deserialize, Serialize};

/// A candidate the filter turned away, with the reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub resource: String,
    pub mismatches: Vec<Mismatch>,
}

/// Outcome of matching one resolved definition against one catalog snapshot.
///
/// An empty pair set is a normal outcome: nothing qualifies right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub builder: BuilderName,
    pub worker_filter: Option<FilterExpr>,
    pub image_filter: Option<FilterExpr>,
    /// Eligible workers, catalog order.
    pub workers: Vec<Resource>,
    /// Eligible images, catalog order.
    pub images: Vec<Resource>,
    pub rejected_workers: Vec<Rejection>,
    pub rejected_images: Vec<Rejection>,
}

impl MatchReport {
    /// Every eligible `(worker, image)` pair, worker-major.
    pub fn pairs(&self) -> Vec<(Resource, Resource)> {
        self.workers
            .iter()
            .flat_map(|w| self.images.iter().map(move |i| (w.clone(), i.clone())))
            .collect()
    }

    /// The first pair in worker-major order.
    pub fn first_pair(&self) -> Option<(&Resource, &Resource)> {
        Some((self.workers.first()?, self.images.first()?))
    }

    pub fn pair_count(&self) -> usize {
        self.workers.len() * self.images.len()
    }

    pub fn is_unschedulable(&self) -> bool {
        self.workers.is_empty() || self.images.is_empty()
    }
}

/// Stateless matcher; every call works on the snapshot it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceMatcher;

impl ResourceMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Eligible `(worker, image)` pairs, worker-major, catalog order.
    pub fn select(
        &self,
        resolved: &ResolvedDefinition,
        workers: &[Resource],
        images: &[Resource],
    ) -> Vec<(Resource, Resource)> {
        let workers = eligible(resolved.worker_filter.as_ref(), workers);
        let images = eligible(resolved.image_filter.as_ref(), images);
        workers
            .iter()
            .flat_map(|w| images.iter().map(move |i| (w.clone(), i.clone())))
            .collect()
    }

    /// Match and keep enough detail to explain an empty result.
    pub fn evaluate(&self, resolved: &ResolvedDefinition, catalog: &CatalogSnapshot) -> MatchReport {
        let (workers, rejected_workers) = partition(resolved.worker_filter.as_ref(), &catalog.workers);
        let (images, rejected_images) = partition(resolved.image_filter.as_ref(), &catalog.images);
        MatchReport {
            builder: resolved.name.clone(),
            worker_filter: resolved.worker_filter.clone(),
            image_filter: resolved.image_filter.clone(),
            workers,
            images,
            rejected_workers,
            rejected_images,
        }
    }
}

/// `None` compiles to accept-all; a pattern that fails to compile rejects all.
fn compile(filter: Option<&FilterExpr>) -> Option<CompiledFilter> {
    match filter {
        None => Some(CompiledFilter::accept_all()),
        Some(expr) => CompiledFilter::compile(expr).ok(),
    }
}

/// Resources in `pool` accepted by `filter`, in pool order.
pub fn eligible(filter: Option<&FilterExpr>, pool: &[Resource]) -> Vec<Resource> {
    let Some(compiled) = compile(filter) else {
        return vec![];
    };
    pool.iter().filter(|r| compiled.matches(r)).cloned().collect()
}

fn partition(filter: Option<&FilterExpr>, pool: &[Resource]) -> (Vec<Resource>, Vec<Rejection>) {
    let compiled = compile(filter);
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for resource in pool {
        if compiled.as_ref().is_some_and(|c| c.matches(resource)) {
            accepted.push(resource.clone());
        } else {
            rejected.push(Rejection {
                resource: resource.name.clone(),
                mismatches: filter.map(|f| explain(f, resource)).unwrap_or_default(),
            });
        }
    }
    (accepted, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(pairs: &[(Resource, Resource)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(w, i)| (w.name.clone(), i.name.clone()))
            .collect()
    }

    fn resolved(worker: Option<FilterExpr>, image: Option<FilterExpr>) -> ResolvedDefinition {
        ResolvedDefinition {
            name: BuilderName::new("b"),
            worker_filter: worker,
            image_filter: image,
            ..Default::default()
        }
    }

    #[test]
    fn test_cross_product_is_worker_major() {
        let workers = vec![Resource::new("w1"), Resource::new("w2")];
        let images = vec![Resource::new("i1"), Resource::new("i2")];
        let pairs = ResourceMatcher::new().select(&resolved(None, None), &workers, &images);
        assert_eq!(
            names(&pairs),
            vec![
                ("w1".to_string(), "i1".to_string()),
                ("w1".to_string(), "i2".to_string()),
                ("w2".to_string(), "i1".to_string()),
                ("w2".to_string(), "i2".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_tag_yields_empty_not_error() {
        let def = resolved(Some(FilterExpr::has_tag("cuda")), None);
        let catalog = CatalogSnapshot::new(
            vec![Resource::new("w1").with_tag("docker")],
            vec![Resource::new("i1")],
        );

        let report = ResourceMatcher::new().evaluate(&def, &catalog);
        assert!(report.is_unschedulable());
        assert!(report.pairs().is_empty());
        assert_eq!(report.first_pair(), None);
        assert_eq!(report.rejected_workers.len(), 1);
        assert_eq!(
            report.rejected_workers[0].mismatches[0].to_string(),
            "expected has tag cuda, found docker"
        );
    }

    #[test]
    fn test_evaluate_agrees_with_select() {
        let def = resolved(
            Some(FilterExpr::equals("arch", "amd64")),
            Some(FilterExpr::matching("name", "python*")),
        );
        let catalog = CatalogSnapshot::new(
            vec![
                Resource::new("w1").with_attribute("arch", "arm64v8"),
                Resource::new("w2").with_attribute("arch", "amd64"),
            ],
            vec![Resource::new("python-3.7"), Resource::new("cpp"), Resource::new("python-3.8")],
        );

        let matcher = ResourceMatcher::new();
        let report = matcher.evaluate(&def, &catalog);
        assert_eq!(report.pairs(), matcher.select(&def, &catalog.workers, &catalog.images));
        assert_eq!(report.pair_count(), 2);
        assert_eq!(report.rejected_images.len(), 1);
        assert_eq!(report.rejected_images[0].resource, "cpp");
    }
}
