use kafka_types::Cluster;
use rdkafka::config::ClientConfig;

use crate::error::{Error, Result};

/// Build the librdkafka configuration shared by consumers and admin clients.
///
/// Truststore and keystore locations are handed to librdkafka as-is, so they
/// must point at PEM (CA) and PKCS#12 (client) files.
pub fn client_config(cluster: &Cluster) -> Result<ClientConfig> {
    let endpoint = cluster.endpoint.trim();
    if endpoint.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "cluster '{}' has no endpoint",
            cluster.name
        )));
    }

    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", endpoint);

    let protocol = match (cluster.use_ssl, cluster.use_sasl) {
        (false, false) => "plaintext",
        (true, false) => "ssl",
        (false, true) => "sasl_plaintext",
        (true, true) => "sasl_ssl",
    };
    config.set("security.protocol", protocol);

    if cluster.use_ssl {
        let ssl = &cluster.ssl_configuration;
        if let Some(location) = &ssl.ssl_truststore_location {
            config.set("ssl.ca.location", location);
        }
        if let Some(location) = &ssl.ssl_keystore_location {
            config.set("ssl.keystore.location", location);
        }
        if let Some(password) = &ssl.ssl_key_store_password {
            config.set("ssl.keystore.password", password);
        }
        if ssl.ssl_truststore_password.is_some() {
            tracing::debug!("Ignoring truststore password: librdkafka reads CA files unencrypted");
        }
    }

    if cluster.use_sasl {
        let sasl = &cluster.sasl_configuration;
        let (Some(username), Some(password)) = (&sasl.sasl_username, &sasl.sasl_password) else {
            return Err(Error::InvalidConfig(format!(
                "cluster '{}' enables SASL without username and password",
                cluster.name
            )));
        };
        let mechanism = if sasl.use_scram {
            "SCRAM-SHA-512"
        } else {
            "PLAIN"
        };
        config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    Ok(config)
}
