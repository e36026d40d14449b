use std::collections::BTreeMap;
use std::path::Path;

use kube_assets::pki::inspect::CertificateInfo;
use kube_assets::render::RenderSummary;

pub(crate) fn print_render_summary(
    summary: &RenderSummary,
    kms_key_arn: Option<&str>,
    output: Option<&Path>,
) {
    println!("Credentials rendered in {}", summary.assets_dir.display());
    if summary.ca_generated {
        println!("- CA: generated");
    } else {
        println!("- CA: existing");
    }
    println!("- issued: {}", name_list(&summary.issued));
    println!("- reused: {}", name_list(&summary.reused));
    match kms_key_arn {
        Some(key_arn) => println!("- encryption: KMS ({key_arn})"),
        None => println!("- encryption: disabled"),
    }
    if let Some(output) = output {
        println!("- compact assets: {}", output.display());
    }
}

pub(crate) fn print_certificates(certificates: &BTreeMap<String, Vec<CertificateInfo>>) {
    for (file_name, infos) in certificates {
        println!("--- {file_name} ---");
        for info in infos {
            println!("{info}");
            println!();
        }
    }
}

pub(crate) fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
