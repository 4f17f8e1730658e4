//! Built-in taxonomies.
//!
//! Every provider reports the same seven licensing buckets so that reports
//! from different clouds line up. The names carry the provider-specific
//! service in parentheses where it differs.

use crate::model::Provider;
use crate::taxonomy::{CategoryDef, CategoryRule, Taxonomy};

pub const VIRTUAL_MACHINES: &str = "Virtual Machines (VMs)";
pub const CAAS: &str = "Container as a Service (CaaS)";
pub const SERVERLESS: &str = "Serverless Functions";
pub const DATABASES: &str = "Managed Cloud Database (PaaS)";

type Rule = (&'static str, Option<&'static str>, &'static str);

const AZURE_CATEGORIES: &[(&str, &str)] = &[
    (VIRTUAL_MACHINES, "instances"),
    ("Container Hosts (AKS Clusters)", "nodes"),
    (CAAS, "container groups"),
    (SERVERLESS, "function apps"),
    ("Cloud Buckets (Storage Accounts)", "storage accounts"),
    (DATABASES, "databases"),
    ("Container Registries (ACR)", "registries"),
];

const AZURE_RULES: &[Rule] = &[
    ("microsoft.compute/virtualmachines", None, VIRTUAL_MACHINES),
    (
        "microsoft.containerservice/managedclusters",
        None,
        "Container Hosts (AKS Clusters)",
    ),
    ("microsoft.containerinstance/containergroups", None, CAAS),
    ("microsoft.app/containerapps", None, CAAS),
    ("microsoft.web/sites", Some("functionapp"), SERVERLESS),
    (
        "microsoft.storage/storageaccounts",
        None,
        "Cloud Buckets (Storage Accounts)",
    ),
    ("microsoft.sql/servers", None, DATABASES),
    ("microsoft.sql/managedinstances", None, DATABASES),
    ("microsoft.documentdb/databaseaccounts", None, DATABASES),
    ("microsoft.cache/redis", None, DATABASES),
    ("microsoft.dbformysql/servers", None, DATABASES),
    ("microsoft.dbformysql/flexibleservers", None, DATABASES),
    ("microsoft.dbforpostgresql/servergroupsv2", None, DATABASES),
    ("microsoft.dbforpostgresql/flexibleservers", None, DATABASES),
    ("microsoft.dbforpostgresql/servers", None, DATABASES),
    (
        "microsoft.containerregistry/registries",
        None,
        "Container Registries (ACR)",
    ),
];

const AWS_CATEGORIES: &[(&str, &str)] = &[
    (VIRTUAL_MACHINES, "instances"),
    ("Container Hosts (EKS Clusters)", "clusters"),
    (CAAS, "clusters"),
    (SERVERLESS, "functions"),
    ("Cloud Buckets (S3)", "buckets"),
    (DATABASES, "databases"),
    ("Container Registries (ECR)", "repositories"),
];

const AWS_RULES: &[Rule] = &[
    ("aws::ec2::instance", None, VIRTUAL_MACHINES),
    ("aws::eks::cluster", None, "Container Hosts (EKS Clusters)"),
    ("aws::ecs::cluster", None, CAAS),
    ("aws::lambda::function", None, SERVERLESS),
    ("aws::s3::bucket", None, "Cloud Buckets (S3)"),
    ("aws::rds::dbinstance", None, DATABASES),
    ("aws::dynamodb::table", None, DATABASES),
    ("aws::ecr::repository", None, "Container Registries (ECR)"),
];

const GCP_CATEGORIES: &[(&str, &str)] = &[
    (VIRTUAL_MACHINES, "instances"),
    ("Container Hosts (GKE Nodes)", "nodes"),
    (CAAS, "services"),
    (SERVERLESS, "functions"),
    ("Cloud Buckets (Cloud Storage)", "buckets"),
    (DATABASES, "instances"),
    ("Container Registries (Artifact Registry)", "repositories"),
];

const GCP_RULES: &[Rule] = &[
    ("gcp::compute::instance", None, VIRTUAL_MACHINES),
    ("gcp::container::cluster", None, "Container Hosts (GKE Nodes)"),
    ("gcp::run::service", None, CAAS),
    ("gcp::functions::function", None, SERVERLESS),
    ("gcp::storage::bucket", None, "Cloud Buckets (Cloud Storage)"),
    ("gcp::sql::instance", None, DATABASES),
    (
        "gcp::artifacts::repository",
        Some("docker"),
        "Container Registries (Artifact Registry)",
    ),
];

/// The built-in taxonomy for a provider.
pub fn for_provider(provider: Provider) -> Taxonomy {
    match provider {
        Provider::Aws => build(AWS_CATEGORIES, AWS_RULES),
        Provider::Azure => build(AZURE_CATEGORIES, AZURE_RULES),
        Provider::Gcp => build(GCP_CATEGORIES, GCP_RULES),
    }
}

fn build(categories: &[(&str, &str)], rules: &[Rule]) -> Taxonomy {
    Taxonomy {
        categories: categories
            .iter()
            .map(|(name, unit)| CategoryDef {
                name: (*name).to_string(),
                unit: (*unit).to_string(),
            })
            .collect(),
        rules: rules
            .iter()
            .map(|(resource_type, kind, category)| CategoryRule {
                resource_type: (*resource_type).to_string(),
                kind_contains: kind.map(str::to_string),
                category: (*category).to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        for provider in Provider::value_variants() {
            let taxonomy = for_provider(*provider);
            let validated =
                Taxonomy::new(taxonomy.categories.clone(), taxonomy.rules.clone()).unwrap();
            assert_eq!(validated, taxonomy, "{provider} defaults are not normalized");
            assert_eq!(taxonomy.categories().len(), 7);
        }
    }

    #[test]
    fn test_azure_order_matches_report_order() {
        let names: Vec<_> = for_provider(Provider::Azure)
            .categories()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names[0], VIRTUAL_MACHINES);
        assert_eq!(names[1], "Container Hosts (AKS Clusters)");
        assert_eq!(names[6], "Container Registries (ACR)");
    }
}
