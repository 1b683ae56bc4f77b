//! Bindings for the storage service, provider registry, token and payments
//! contracts. Only the view functions the exporter reads are declared.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

/// Product type of the PDP storage offering.
pub const PDP_PRODUCT_TYPE: u8 = 0;

sol! {
    struct ServiceProviderInfo {
        address serviceProvider;
        address payee;
        string name;
        string description;
        bool isActive;
    }

    struct ServiceProviderInfoView {
        uint256 providerId;
        ServiceProviderInfo info;
    }

    struct ServiceProduct {
        uint8 productType;
        bytes productData;
        string[] capabilityKeys;
        bool isActive;
    }

    struct ProviderWithProduct {
        uint256 providerId;
        ServiceProviderInfo providerInfo;
        ServiceProduct product;
        bytes[] productCapabilityValues;
    }

    #[sol(rpc)]
    interface IWarmStorageService {
        function viewContractAddress() external view returns (address);
        function serviceProviderRegistry() external view returns (address);
    }

    #[sol(rpc)]
    interface IWarmStorageView {
        function getApprovedProviders(uint256 offset, uint256 limit) external view returns (uint256[] memory);
    }

    #[sol(rpc)]
    interface IServiceProviderRegistry {
        function getProviderCount() external view returns (uint256);
        function getProvider(uint256 providerId) external view returns (ServiceProviderInfoView memory);
        function getProviderWithProduct(uint256 providerId, uint8 productType) external view returns (ProviderWithProduct memory);
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IPayments {
        function getAccountInfoIfSettled(address token, address owner)
            external
            view
            returns (
                uint256 fundedUntilEpoch,
                uint256 currentFunds,
                uint256 availableFunds,
                uint256 currentLockupRate
            );
    }
}
