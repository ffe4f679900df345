//! ABI surface of the lab contracts.
//!
//! Only the entry points the scenarios touch are declared; the artifacts may expose more.

alloy::sol! {
    interface IVulnerableVault {
        function deposit() external payable;
        function withdraw() external;
        function balances(address account) external view returns (uint256);
    }

    interface IReentrancyAttacker {
        function attack() external payable;
        function collect() external;
    }

    interface ILottery {
        function enter() external payable;
        function getPlayers() external view returns (address[] memory);
        function claimPrize(uint256 guess) external;
    }

    interface ILotteryAttack {
        function attack() external payable;
    }

    interface IBadAccessControl {
        function deposit() external payable;
        function owner() external view returns (address);
        function setOwner(address newOwner) external;
        function withdrawAll() external;
    }

    interface IProxy {
        function implementation() external view returns (address);
        function upgradeTo(address newImplementation) external;
    }

    interface ILogic {
        function version() external view returns (uint256);
        function sweep(address to) external;
    }
}
