// COS Transfer Library for S3-compatible Object Storage
// Copyright 2025 cos-transfer contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::config::CosConfig;
use super::http::{Endpoint, Host, HostKind, Url, change_host_suffix};
use super::multimap_ext::{Multimap, MultimapExt};

fn endpoint(region: &str, app_id: u64) -> Endpoint {
    Endpoint::from_config(&CosConfig::new("ak", "sk", region).app_id(app_id))
}

// ===========================
// Url Tests
// ===========================

#[test]
fn test_url_display_with_query() {
    let mut query = Multimap::new();
    query.add("uploadId", "abc");
    query.add("partNumber", "2");
    let url = Url {
        https: true,
        host: "examplebucket-1250000000.cos.ap-beijing.myqcloud.com".to_string(),
        port: 0,
        path: "/dir/obj".to_string(),
        query,
    };
    assert_eq!(
        url.to_string(),
        "https://examplebucket-1250000000.cos.ap-beijing.myqcloud.com/dir/obj?partNumber=2&uploadId=abc"
    );
}

#[test]
fn test_url_host_header_value_with_port() {
    let url = Url {
        https: false,
        host: "10.0.0.1".to_string(),
        port: 8080,
        path: "/".to_string(),
        query: Multimap::new(),
    };
    assert_eq!(url.host_header_value(), "10.0.0.1:8080");
    assert_eq!(url.to_string(), "http://10.0.0.1:8080/");
}

// ===========================
// Default host Tests
// ===========================

#[test]
fn test_default_host_appends_app_id() {
    assert_eq!(
        endpoint("ap-guangzhou", 1250000000).default_host_name("examplebucket"),
        "examplebucket-1250000000.cos.ap-guangzhou.myqcloud.com"
    );
}

#[test]
fn test_default_host_skips_existing_app_id() {
    assert_eq!(
        endpoint("ap-guangzhou", 1250000000).default_host_name("examplebucket-1250000000"),
        "examplebucket-1250000000.cos.ap-guangzhou.myqcloud.com"
    );
    assert_eq!(
        endpoint("ap-guangzhou", 0).default_host_name("examplebucket-1250000000"),
        "examplebucket-1250000000.cos.ap-guangzhou.myqcloud.com"
    );
}

#[test]
fn test_default_host_legacy_regions() {
    assert_eq!(
        endpoint("cn-south", 0).default_host_name("b-1"),
        "b-1.cn-south.myqcloud.com"
    );
    assert_eq!(
        endpoint("cos.ap-shanghai", 0).default_host_name("b-1"),
        "b-1.cos.ap-shanghai.myqcloud.com"
    );
}

// ===========================
// Host selection Tests
// ===========================

#[test]
fn test_select_host_priority() {
    let mut ep = endpoint("ap-guangzhou", 0);
    assert_eq!(ep.select_host("b-1").kind, HostKind::Default);
    assert!(ep.uses_default_domain());

    ep.dest_domain = Some("https://static.example.com".to_string());
    let host = ep.select_host("b-1");
    assert_eq!(host.kind, HostKind::DestDomain);
    assert_eq!(host.name, "static.example.com");
    assert!(host.https);
    assert!(!ep.uses_default_domain());

    ep.intranet_addr = Some("10.0.0.1:8080".to_string());
    let host = ep.select_host("b-1");
    assert_eq!(host.kind, HostKind::Intranet);
    assert_eq!(host.name, "10.0.0.1");
    assert_eq!(host.port, 8080);
}

#[test]
fn test_accelerate_is_not_default_domain() {
    let ep = endpoint("accelerate", 0);
    assert!(!ep.uses_default_domain());
    let host = ep.select_host("b-1");
    assert_eq!(host.name, "b-1.cos.accelerate.myqcloud.com");
    assert!(host.backup().is_none());
}

#[test]
fn test_backup_host() {
    let host = endpoint("ap-guangzhou", 0).select_host("b-1");
    let backup = host.backup().unwrap();
    assert_eq!(backup.kind, HostKind::Backup);
    assert_eq!(backup.name, "b-1.cos.ap-guangzhou.tencentcos.cn");
    assert!(backup.backup().is_none());

    let custom = Host {
        kind: HostKind::DestDomain,
        https: false,
        name: "static.example.com".to_string(),
        port: 0,
    };
    assert!(custom.backup().is_none());
}

#[test]
fn test_change_host_suffix() {
    assert_eq!(change_host_suffix("a.cos.ap-beijing.myqcloud.com"), "a.cos.ap-beijing.tencentcos.cn");
    assert_eq!(change_host_suffix("example.com"), "example.com");
}

#[test]
fn test_object_path_is_encoded() {
    let host = endpoint("ap-guangzhou", 0).select_host("b-1");
    let url = host.url(Some("dir/a b.txt"), Multimap::new());
    assert_eq!(url.path, "/dir/a%20b.txt");
}
