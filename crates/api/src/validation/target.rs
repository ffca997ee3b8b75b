//! 扫描目标值校验

use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

use reconflow_domain::entities::TargetType;
use reconflow_errors::{ReconError, ReconResult};

/// 域名校验正则，覆盖常见情况（非完整 RFC 实现）
fn domain_regex() -> &'static Regex {
    static DOMAIN_REGEX: OnceLock<Regex> = OnceLock::new();
    DOMAIN_REGEX.get_or_init(|| {
        Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
            .expect("域名正则不合法")
    })
}

/// 按目标类型校验值的合法性
pub fn validate_target_value(target_type: TargetType, value: &str) -> ReconResult<()> {
    match target_type {
        TargetType::Ip => {
            if value.parse::<IpAddr>().is_err() {
                return Err(ReconError::InvalidTarget(format!(
                    "'{value}' 不是一个合法的IPv4或IPv6地址"
                )));
            }
        }
        TargetType::Cidr => {
            if value.parse::<ipnet::IpNet>().is_err() {
                return Err(ReconError::InvalidTarget(format!(
                    "'{value}' 不是一个合法的CIDR地址块"
                )));
            }
        }
        TargetType::Domain => {
            if !domain_regex().is_match(value) {
                return Err(ReconError::InvalidTarget(format!(
                    "'{value}' 不是一个格式合法的域名"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_domains() {
        for value in ["example.com", "a.b.example.co.uk", "x1-y2.example.io"] {
            assert!(
                validate_target_value(TargetType::Domain, value).is_ok(),
                "{value} 应当合法"
            );
        }
    }

    #[test]
    fn test_invalid_domains() {
        for value in ["", "not a domain", "example", "-bad.example.com", "1.2.3.4"] {
            assert!(
                validate_target_value(TargetType::Domain, value).is_err(),
                "{value} 应当非法"
            );
        }
    }

    #[test]
    fn test_ip_validation() {
        assert!(validate_target_value(TargetType::Ip, "1.2.3.4").is_ok());
        assert!(validate_target_value(TargetType::Ip, "2001:db8::1").is_ok());
        assert!(validate_target_value(TargetType::Ip, "999.1.1.1").is_err());
        assert!(validate_target_value(TargetType::Ip, "example.com").is_err());
    }

    #[test]
    fn test_cidr_validation() {
        assert!(validate_target_value(TargetType::Cidr, "10.0.0.0/8").is_ok());
        assert!(validate_target_value(TargetType::Cidr, "2001:db8::/32").is_ok());
        assert!(validate_target_value(TargetType::Cidr, "10.0.0.0").is_err());
        assert!(validate_target_value(TargetType::Cidr, "10.0.0.0/40").is_err());
    }
}
