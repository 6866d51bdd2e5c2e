pub mod api;
pub mod db;
pub mod facade;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use jobpay_types::{
        ChargeStatus, Currency, InitiatedPayment, PaymentError, PaymentRequest, PaymentResult,
        ProviderKind,
    };
    use url::Url;

    use crate::facade::Gateway;

    /// Scripted gateway double. Counters record which path a flow took;
    /// `set_status` scripts what the next status checks report.
    pub struct MockGateway {
        pub initiate_calls: AtomicUsize,
        pub direct_pay_calls: AtomicUsize,
        pub status_calls: AtomicUsize,
        pub fail_initiate: bool,
        pub fail_status: bool,
        pub status: Mutex<ChargeStatus>,
    }

    impl Default for MockGateway {
        fn default() -> Self {
            MockGateway {
                initiate_calls: AtomicUsize::new(0),
                direct_pay_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                fail_initiate: false,
                fail_status: false,
                status: Mutex::new(ChargeStatus::Pending),
            }
        }
    }

    impl MockGateway {
        pub fn set_status(&self, status: ChargeStatus) {
            *self.status.lock().unwrap() = status;
        }

        fn transport(&self, provider: ProviderKind) -> PaymentError {
            PaymentError::Transport {
                provider,
                message: "connection reset".to_string(),
            }
        }
    }

    #[async_trait]
    impl Gateway for MockGateway {
        async fn initiate(
            &self,
            provider: ProviderKind,
            request: &PaymentRequest,
        ) -> PaymentResult<InitiatedPayment> {
            let n = self.initiate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_initiate {
                return Err(self.transport(provider));
            }
            Ok(InitiatedPayment {
                reference: format!("ext-{}-{n}", request.transaction_id),
                redirect_url: Some(
                    Url::parse("https://checkout.example/session").map_err(|e| {
                        PaymentError::Configuration(e.to_string())
                    })?,
                ),
            })
        }

        async fn direct_pay(
            &self,
            provider: ProviderKind,
            _phone: &str,
            request: &PaymentRequest,
        ) -> PaymentResult<InitiatedPayment> {
            let n = self.direct_pay_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_initiate {
                return Err(self.transport(provider));
            }
            Ok(InitiatedPayment {
                reference: format!("ext-{}-{n}", request.transaction_id),
                redirect_url: None,
            })
        }

        async fn check_status(
            &self,
            provider: ProviderKind,
            _reference: &str,
        ) -> PaymentResult<ChargeStatus> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_status {
                return Err(self.transport(provider));
            }
            Ok(self.status.lock().unwrap().clone())
        }

        async fn balance(&self, _provider: ProviderKind) -> PaymentResult<i64> {
            Ok(123_456)
        }

        async fn payout(
            &self,
            _provider: ProviderKind,
            _phone: &str,
            _amount: i64,
            _currency: Currency,
            _description: &str,
        ) -> PaymentResult<String> {
            Ok("payout-ref".to_string())
        }
    }
}
